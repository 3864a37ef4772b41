use lazyscope::api::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Default, Clone, PartialEq)]
struct RequestContext {
    user: String,
    trace_id: Option<u64>,
}

impl Dependency for RequestContext {}

impl ScopedClone for RequestContext {
    fn clone_skipping(&self, skip: &BTreeSet<&'static str>) -> Self {
        RequestContext {
            user: self.user.clone(),
            trace_id: if skip.contains("trace_id") {
                None
            } else {
                self.trace_id
            },
        }
    }
}

#[test]
fn test_seeded_scope_round_trip() {
    let root = ScopeNode::builder()
        .detached()
        .copy_as_template(true)
        .seed(42i64)
        .build()
        .unwrap();

    let guard = root.enter().unwrap();
    let active = guard.node();
    assert_eq!(*active.get::<i64>().unwrap(), 42);
    assert!(!active.ptr_eq(&root));
    guard.exit().unwrap();
}

#[test]
fn test_nested_requests_see_innermost_context() {
    let outer = RequestContext {
        user: "alice".to_string(),
        trace_id: Some(1),
    };
    let inner = RequestContext {
        user: "bob".to_string(),
        trace_id: Some(2),
    };

    outer
        .run_with(|| {
            assert_eq!(RequestContext::grab().unwrap().user, "alice");
            inner
                .clone()
                .run_with(|| assert_eq!(RequestContext::grab().unwrap().user, "bob"))
                .unwrap();
            assert_eq!(RequestContext::grab().unwrap().user, "alice");
        })
        .unwrap();
}

#[test]
fn test_copy_current_drops_skipped_fields() {
    declare::<RequestContext>(DependencyConfig::new().skip_field("trace_id"));

    let context = RequestContext {
        user: "carol".to_string(),
        trace_id: Some(99),
    };
    let copied = context
        .run_with(|| copy_current::<RequestContext>().unwrap())
        .unwrap();
    assert_eq!(
        copied,
        RequestContext {
            user: "carol".to_string(),
            trace_id: None,
        }
    );
}

#[test]
fn test_declared_factory_builds_trait_object() {
    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            self.0
        }
    }

    declare_with_factory::<dyn Clock, _, _>(DependencyConfig::new(), || {
        Ok::<Arc<dyn Clock>, ScopeError>(Arc::new(FixedClock(1_700_000_000)))
    });

    let clock = ScopeNode::scoped(|scope| scope.try_get::<dyn Clock>().unwrap()).unwrap();
    assert_eq!(clock.now(), 1_700_000_000);
}

#[test]
fn test_proxy_resolves_per_thread() {
    #[derive(Default)]
    struct Worker {
        slot: u8,
    }

    impl Dependency for Worker {}

    declare::<Worker>(DependencyConfig::per_thread());
    let proxy = Worker::proxy();

    let handles: Vec<_> = (0..2u8)
        .map(|slot| {
            let proxy = proxy.clone();
            thread::spawn(move || {
                Worker { slot }
                    .run_with(|| proxy.with(|worker| worker.slot).unwrap())
                    .unwrap()
            })
        })
        .collect();

    let mut slots: Vec<u8> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    slots.sort_unstable();
    assert_eq!(slots, vec![0, 1]);
}

#[test]
fn test_guard_stack_unwinds_in_order() {
    let depth = activation_depth();
    let a = ScopeNode::builder().name("a").build().unwrap();
    let b = ScopeNode::builder().name("b").build().unwrap();

    let guard_a = a.enter().unwrap();
    let guard_b = b.enter().unwrap();
    assert_eq!(b.parent().unwrap(), Some(a.clone()));
    assert_eq!(activation_depth(), depth + 2);

    drop(guard_b);
    assert_eq!(current_scope(), a);
    drop(guard_a);
    assert_eq!(activation_depth(), depth);
}
