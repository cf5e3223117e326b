//! Trigger binding lifecycle through the compiler
//!
//! Scheduled jobs built from a stack configuration: enable, fire,
//! self-disable, reachability and revoked permissions.

use infra_policy::iam::action_set;
use infra_policy::{
    Action, Binding, BindingState, Capability, Effect, FireOutcome, JobInvoker, JobSpec,
    PolicyCompiler, PolicyError, PolicyRule, Principal, Resource, ResourceId, ScheduleDescriptor,
    StackConfig, StackTemplate,
};
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct RecordingInvoker {
    calls: Mutex<Vec<(ResourceId, String)>>,
}

impl RecordingInvoker {
    fn count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl JobInvoker for RecordingInvoker {
    fn invoke(&self, job: &ResourceId, binding: &Binding) {
        self.calls.lock().push((job.clone(), binding.id.clone()));
    }
}

fn id(s: &str) -> ResourceId {
    ResourceId::new(s).unwrap()
}

fn scheduled_stack(self_disable: bool) -> PolicyCompiler {
    let config = StackConfig::from_toml_str(&format!(
        r#"
        team_id = "team42"
        fetch_job = false
        crawlers = []

        [[scheduled_jobs]]
        name = "nightly-export"
        schedule = "cron(0 2 * * ? *)"
        self_disable = {}
        "#,
        self_disable
    ))
    .unwrap();
    StackTemplate::build(&config).unwrap()
}

const BINDING: &str = "nightly-export-schedule-fires-nightly-export";

#[test]
fn test_binding_starts_disabled() {
    let compiler = scheduled_stack(true);
    let invoker = RecordingInvoker::default();

    let binding = compiler.binding(BINDING).unwrap();
    assert_eq!(binding.state, BindingState::Disabled);
    assert_eq!(binding.schedule.expression(), "cron(0 2 * * ? *)");

    for _ in 0..5 {
        assert_eq!(compiler.fire(BINDING, &invoker).unwrap(), FireOutcome::Skipped);
    }
    assert_eq!(invoker.count(), 0);
    assert!(!compiler.is_reachable(&id("nightly-export")));
}

#[test]
fn test_enabled_binding_invokes_once_per_fire() {
    let compiler = scheduled_stack(true);
    let invoker = RecordingInvoker::default();

    compiler.enable(BINDING).unwrap();
    assert!(compiler.is_reachable(&id("nightly-export")));

    for expected in 1..=3 {
        assert_eq!(compiler.fire(BINDING, &invoker).unwrap(), FireOutcome::Invoked);
        assert_eq!(invoker.count(), expected);
    }

    let calls = invoker.calls.lock();
    assert!(calls
        .iter()
        .all(|(job, binding)| job.as_str() == "nightly-export" && binding == BINDING));
}

#[test]
fn test_self_disable_stops_future_fires() {
    let compiler = scheduled_stack(true);
    let invoker = RecordingInvoker::default();

    compiler.enable(BINDING).unwrap();
    compiler.fire(BINDING, &invoker).unwrap();

    // the job turns its own schedule off after the first run
    compiler.self_disable(BINDING).unwrap();
    assert_eq!(compiler.binding(BINDING).unwrap().state, BindingState::Disabled);

    assert_eq!(compiler.fire(BINDING, &invoker).unwrap(), FireOutcome::Skipped);
    assert_eq!(invoker.count(), 1);
    assert!(!compiler.is_reachable(&id("nightly-export")));
}

/// A job that switches its own schedule off while it runs
struct SelfDisablingInvoker {
    compiler: Arc<PolicyCompiler>,
    results: Mutex<Vec<Result<(), PolicyError>>>,
}

impl JobInvoker for SelfDisablingInvoker {
    fn invoke(&self, _job: &ResourceId, binding: &Binding) {
        let result = self.compiler.self_disable(&binding.id);
        self.results.lock().push(result);
    }
}

#[test]
fn test_job_can_self_disable_from_inside_fire() {
    let compiler = Arc::new(scheduled_stack(true));
    compiler.enable(BINDING).unwrap();
    let invoker = Arc::new(SelfDisablingInvoker {
        compiler: Arc::clone(&compiler),
        results: Mutex::new(Vec::new()),
    });

    let (tx, rx) = mpsc::channel();
    let handle = {
        let compiler = Arc::clone(&compiler);
        let invoker = Arc::clone(&invoker);
        thread::spawn(move || {
            let first = compiler.fire(BINDING, invoker.as_ref()).unwrap();
            let second = compiler.fire(BINDING, invoker.as_ref()).unwrap();
            tx.send((first, second)).unwrap();
        })
    };

    // a fire that keeps its lock across the job never answers
    let (first, second) = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("fire did not return while the job called back into the compiler");
    handle.join().unwrap();

    assert_eq!(first, FireOutcome::Invoked);
    assert_eq!(second, FireOutcome::Skipped);
    let results = invoker.results.lock();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok());
    assert_eq!(compiler.binding(BINDING).unwrap().state, BindingState::Disabled);
}

#[test]
fn test_self_disable_needs_grant_not_just_rule() {
    let compiler = scheduled_stack(false);
    compiler.enable(BINDING).unwrap();

    // a blanket allow would pass the resolver check on its own
    compiler
        .add_rule(
            PolicyRule::new(
                Effect::Allow,
                Principal::Any,
                action_set(&[Action::All]),
                "/**",
            )
            .with_sid("allow-everything"),
        )
        .unwrap();
    assert!(compiler
        .grants()
        .iter()
        .all(|g| !g.actions.contains(&Action::Disable)));

    let err = compiler.self_disable(BINDING).unwrap_err();
    assert!(matches!(err, PolicyError::PermissionDenied(_)));
    assert_eq!(compiler.binding(BINDING).unwrap().state, BindingState::Enabled);
}

#[test]
fn test_self_disable_without_permission() {
    let compiler = scheduled_stack(false);
    compiler.enable(BINDING).unwrap();

    let err = compiler.self_disable(BINDING).unwrap_err();
    assert!(matches!(err, PolicyError::PermissionDenied(_)));
    assert_eq!(compiler.binding(BINDING).unwrap().state, BindingState::Enabled);

    // an administrator can still turn it off
    compiler.disable(BINDING).unwrap();
    assert_eq!(compiler.binding(BINDING).unwrap().state, BindingState::Disabled);
}

#[test]
fn test_fire_after_invoke_grant_revoked() {
    let compiler = scheduled_stack(true);
    let invoker = RecordingInvoker::default();
    compiler.enable(BINDING).unwrap();

    let invoke_grant = compiler
        .grants()
        .into_iter()
        .find(|g| g.actions.contains(&Action::Invoke))
        .unwrap();
    compiler.revoke_grant(&invoke_grant.id).unwrap();

    let err = compiler.fire(BINDING, &invoker).unwrap_err();
    assert!(matches!(err, PolicyError::PermissionDenied(_)));
    assert_eq!(invoker.count(), 0);
    assert!(!compiler.is_reachable(&id("nightly-export")));
}

#[test]
fn test_manual_binding() {
    let compiler = PolicyCompiler::default();
    let job = id("report");
    let trigger = id("weekly");

    compiler
        .add_resource(Resource::trigger(
            trigger.clone(),
            ScheduleDescriptor::new("rate(7 days)"),
            true,
        ))
        .unwrap();
    compiler
        .add_resource(Resource::compute_job(
            job.clone(),
            JobSpec::new("report-role")
                .with_capability(Capability::new(job.clone(), &[Action::Invoke])),
        ))
        .unwrap();

    // bound before any grant exists: enabled, but not reachable yet
    let binding = compiler.bind(&trigger, &job).unwrap();
    assert_eq!(binding.id, Binding::id_for(&trigger, &job));
    assert!(binding.is_enabled());
    assert!(!compiler.is_reachable(&job));

    compiler.plan_grants(&job).unwrap();
    assert!(compiler.is_reachable(&job));

    let err = compiler.bind(&trigger, &job).unwrap_err();
    assert!(matches!(err, PolicyError::AlreadyExists(_)));

    // referenced resources can't be removed while bound
    let err = compiler.remove_resource(&trigger).unwrap_err();
    assert!(matches!(err, PolicyError::Conflict(_)));

    compiler.unbind(&binding.id).unwrap();
    compiler.remove_resource(&trigger).unwrap();
    assert!(!compiler.is_reachable(&job));
    compiler.verify().unwrap();
}

#[test]
fn test_bind_rejects_wrong_kinds() {
    let compiler = PolicyCompiler::default();
    compiler.add_resource(Resource::log_group(id("logs"))).unwrap();
    compiler
        .add_resource(Resource::compute_job(id("job"), JobSpec::new("job-role")))
        .unwrap();

    assert!(compiler.bind(&id("logs"), &id("job")).is_err());
    assert!(matches!(
        compiler.bind(&id("missing"), &id("job")).unwrap_err(),
        PolicyError::NotFound(_)
    ));
    assert!(compiler.bindings().is_empty());
}
