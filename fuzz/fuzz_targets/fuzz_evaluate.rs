#![no_main]
use arbitrary::Arbitrary;
use infra_policy::{
    Action, EncryptionGate, PolicyResolver, Principal, RequestContext, Resource, ResourceCatalog,
    ResourceId, ENCRYPTION_KEY_ID_KEY, ENCRYPTION_MODE_KEY,
};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    mode: Option<String>,
    key_id: Option<String>,
}

// The encryption deny rules and the compliance predicate agree on any header values
fuzz_target!(|input: Input| {
    let key = ResourceId::new("dataedu-key").unwrap();
    let raw = ResourceId::new("raw").unwrap();
    let mut catalog = ResourceCatalog::new();
    catalog.insert(Resource::key(key.clone())).unwrap();
    catalog
        .insert(Resource::storage_container(raw.clone(), key))
        .unwrap();

    let gate = EncryptionGate::default().for_container(&catalog, &raw).unwrap();
    let mut rules = gate.deny_rules().to_vec();
    rules.push(infra_policy::PolicyRule::new(
        infra_policy::Effect::Allow,
        Principal::Any,
        infra_policy::iam::action_set(&[Action::Write]),
        "/storage/raw",
    ));
    let resolver = PolicyResolver::with_rules(rules).unwrap();

    let mut ctx = RequestContext::new();
    if let Some(mode) = &input.mode {
        ctx.insert(ENCRYPTION_MODE_KEY, mode.as_str());
    }
    if let Some(key_id) = &input.key_id {
        ctx.insert(ENCRYPTION_KEY_ID_KEY, key_id.as_str());
    }

    let decision = resolver.decide(&Principal::Any, "/storage/raw", Action::Write, &ctx);
    assert_eq!(
        decision.is_allow(),
        gate.is_write_compliant(input.mode.as_deref(), input.key_id.as_deref())
    );
});
