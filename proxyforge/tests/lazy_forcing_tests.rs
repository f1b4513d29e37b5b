use proxyforge::{
    Contract, Delegate, DelegateObject, LazyInstance, LazyState, MethodSignature, ProxyBuilder,
    ProxyError, TargetType, TypeRef, Value, WrappedInstanceSpec,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn name_sig() -> MethodSignature {
    MethodSignature::new("name", vec![], TypeRef::String)
}

fn size_sig() -> MethodSignature {
    MethodSignature::new("size", vec![], TypeRef::Int)
}

fn touch_sig() -> MethodSignature {
    MethodSignature::new("touch", vec![TypeRef::Long], TypeRef::Void)
}

fn widget_type() -> TargetType {
    TargetType::new("Widget", vec![name_sig(), size_sig(), touch_sig()])
}

fn widget() -> Arc<dyn Delegate> {
    numbered_widget(1)
}

/// A widget whose `name` reports which supplier run produced it.
fn numbered_widget(run: usize) -> Arc<dyn Delegate> {
    Arc::new(
        DelegateObject::builder("Widget")
            .method(name_sig(), move |_| Ok(Value::from(format!("widget-{}", run))))
            .method(size_sig(), |_| Ok(Value::Int(3)))
            .method(touch_sig(), |args| Ok(args[0].clone()))
            .build(),
    )
}

fn counting_lazy(runs: &Arc<AtomicUsize>) -> Arc<LazyInstance> {
    let runs = Arc::clone(runs);
    Arc::new(LazyInstance::new(widget_type(), move || {
        let run = runs.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(numbered_widget(run))
    }))
}

fn widget_contract() -> Contract {
    Contract::new("Widget", vec![name_sig(), size_sig(), touch_sig()]).unwrap()
}

#[test]
fn test_concurrent_first_calls_force_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let lazy = counting_lazy(&runs);
    let proxy = Arc::new(
        ProxyBuilder::new(widget_contract())
            .spec(WrappedInstanceSpec::lazy(Arc::clone(&lazy)))
            .build()
            .unwrap()
            .instantiate(),
    );
    let barrier = Arc::new(Barrier::new(50));

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let proxy = Arc::clone(&proxy);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                proxy.invoke(&name_sig(), &[]).unwrap()
            })
        })
        .collect();
    let names: Vec<Value> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(lazy.state(), LazyState::Forced);
    assert_eq!(names.len(), 50);
    assert!(names.iter().all(|name| *name == Value::from("widget-1")));
}

#[test]
fn test_concurrent_force_shares_one_value() {
    let runs = Arc::new(AtomicUsize::new(0));
    let lazy = counting_lazy(&runs);
    let barrier = Arc::new(Barrier::new(50));

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let lazy = Arc::clone(&lazy);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                lazy.force().unwrap()
            })
        })
        .collect();
    let values: Vec<Arc<dyn Delegate>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    for value in &values[1..] {
        assert!(Arc::ptr_eq(&values[0], value));
    }
}

#[test]
fn test_scenario_b_lazy_wrapped_instance_forced_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let lazy = counting_lazy(&runs);

    let proxy = ProxyBuilder::new(widget_contract())
        .spec(WrappedInstanceSpec::lazy(Arc::clone(&lazy)))
        .build()
        .unwrap()
        .instantiate();

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(lazy.state(), LazyState::Unforced);

    assert_eq!(proxy.invoke(&name_sig(), &[]).unwrap(), Value::from("widget-1"));
    assert_eq!(proxy.invoke(&size_sig(), &[]).unwrap(), Value::Int(3));
    assert_eq!(proxy.invoke(&touch_sig(), &[Value::Long(5)]).unwrap(), Value::Unit);

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(lazy.state(), LazyState::Forced);
}

#[test]
fn test_supplier_with_wrong_type_fails_at_first_call() {
    let lazy = Arc::new(LazyInstance::new(widget_type(), || {
        let other: Arc<dyn Delegate> = Arc::new(
            DelegateObject::builder("Gadget")
                .method(size_sig(), |_| Ok(Value::Int(0)))
                .build(),
        );
        Ok(other)
    }));
    let proxy = ProxyBuilder::new(widget_contract())
        .spec(WrappedInstanceSpec::lazy(Arc::clone(&lazy)))
        .build()
        .unwrap()
        .instantiate();

    let err = proxy.invoke(&size_sig(), &[]).unwrap_err();
    assert_eq!(
        err,
        ProxyError::IncompatibleDelegate {
            method: name_sig().to_string(),
            target_type: "Gadget".to_string(),
        }
    );
    assert_eq!(lazy.state(), LazyState::Unforced);
}

#[test]
fn test_supplier_failure_is_retried_on_next_call() {
    let runs = Arc::new(AtomicUsize::new(0));
    let lazy = {
        let runs = Arc::clone(&runs);
        Arc::new(LazyInstance::new(widget_type(), move || {
            if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ProxyError::target("warming up"))
            } else {
                Ok(widget())
            }
        }))
    };
    let contract = Contract::new("Widget", vec![name_sig()]).unwrap();
    let proxy = ProxyBuilder::new(contract)
        .spec(WrappedInstanceSpec::lazy(Arc::clone(&lazy)))
        .build()
        .unwrap()
        .instantiate();

    assert_eq!(
        proxy.invoke(&name_sig(), &[]).unwrap_err(),
        ProxyError::target("warming up")
    );
    assert_eq!(lazy.state(), LazyState::Unforced);
    assert_eq!(proxy.invoke(&name_sig(), &[]).unwrap(), Value::from("widget-1"));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_predicate_limits_lazy_claims() {
    let runs = Arc::new(AtomicUsize::new(0));
    let lazy = counting_lazy(&runs);
    let contract = Contract::new("Widget", vec![name_sig(), size_sig()]).unwrap();
    let class = ProxyBuilder::new(contract)
        .spec(
            WrappedInstanceSpec::lazy(lazy).with_predicate(|m: &MethodSignature| m.name == "size"),
        )
        .build()
        .unwrap();

    assert_eq!(class.dispatch_table().claimed_count(), 1);
    assert_eq!(class.cached_descriptor(&name_sig()), Some("name()->string"));

    let proxy = class.instantiate();
    assert!(matches!(
        proxy.invoke(&name_sig(), &[]),
        Err(ProxyError::Unhandled(_))
    ));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(proxy.invoke(&size_sig(), &[]).unwrap(), Value::Int(3));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
