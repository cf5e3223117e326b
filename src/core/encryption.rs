//! Encryption enforcement for storage containers
//!
//! Every protected container gets two deny rules that apply to any
//! principal writing to it:
//! - `deny-unapproved-mode`: the write does not declare the approved
//!   encryption mode (missing header, cleartext, or any other mode)
//! - `deny-foreign-key`: the write names a key id other than the
//!   container's designated key
//!
//! A write is compliant iff it declares the approved mode and, when a key
//! id is present, that key id is the container's key. The deny rules and
//! [`ContainerGate::is_write_compliant`] agree on every input.

use crate::catalog::{ResourceCatalog, ResourceKind};
use crate::error::{PolicyError, Result};
use crate::iam::{
    action_set, Action, Condition, ConditionOperator, ConditionValue, Effect, PolicyRule,
    Principal, RequestContext,
};
use crate::validation::ResourceId;

/// Context key carrying the declared encryption mode of a write
pub const ENCRYPTION_MODE_KEY: &str = "storage:encryption-mode";

/// Context key carrying the key id a write asks to be encrypted with
pub const ENCRYPTION_KEY_ID_KEY: &str = "storage:encryption-key-id";

/// Default approved mode (customer-managed key encryption)
pub const DEFAULT_APPROVED_MODE: &str = "kms";

/// Rule family generator for protected containers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionGate {
    approved_mode: String,
}

impl EncryptionGate {
    pub fn new(approved_mode: impl Into<String>) -> Self {
        EncryptionGate {
            approved_mode: approved_mode.into(),
        }
    }

    pub fn approved_mode(&self) -> &str {
        &self.approved_mode
    }

    /// Gate for one catalogued storage container
    ///
    /// Fails with `NotFound` if the container or its key is missing and
    /// with `Validation` if either has the wrong kind.
    pub fn for_container(
        &self,
        catalog: &ResourceCatalog,
        container: &ResourceId,
    ) -> Result<ContainerGate> {
        let key = catalog.key_of(container)?;
        Ok(ContainerGate {
            container: container.clone(),
            key: key.id.clone(),
            approved_mode: self.approved_mode.clone(),
        })
    }

    /// Gates for every storage container in the catalog
    pub fn gates(&self, catalog: &ResourceCatalog) -> Result<Vec<ContainerGate>> {
        catalog
            .of_kind(ResourceKind::StorageContainer)
            .map(|r| self.for_container(catalog, &r.id))
            .collect()
    }

    /// Check that every container's deny pair is present in `rules`
    pub fn verify<'a, I>(&self, catalog: &ResourceCatalog, rules: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a PolicyRule> + Clone,
    {
        for gate in self.gates(catalog)? {
            for expected in gate.deny_rules() {
                if !rules.clone().into_iter().any(|r| *r == expected) {
                    return Err(PolicyError::Validation(format!(
                        "storage container '{}' is missing encryption rule '{}'",
                        gate.container,
                        expected.label()
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for EncryptionGate {
    fn default() -> Self {
        Self::new(DEFAULT_APPROVED_MODE)
    }
}

/// Encryption requirements of a single container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerGate {
    container: ResourceId,
    key: ResourceId,
    approved_mode: String,
}

impl ContainerGate {
    pub fn container(&self) -> &ResourceId {
        &self.container
    }

    pub fn key(&self) -> &ResourceId {
        &self.key
    }

    fn resource_path(&self) -> String {
        crate::catalog::path_of(ResourceKind::StorageContainer, &self.container)
    }

    /// Rule ids used for this container's deny pair
    pub fn rule_ids(container: &ResourceId) -> [String; 2] {
        [
            format!("{}-deny-unapproved-mode", container),
            format!("{}-deny-foreign-key", container),
        ]
    }

    /// The pair of deny rules enforcing encrypted writes
    pub fn deny_rules(&self) -> [PolicyRule; 2] {
        let [mode_sid, key_sid] = Self::rule_ids(&self.container);
        let path = self.resource_path();

        let unapproved_mode = PolicyRule::new(
            Effect::Deny,
            Principal::Any,
            action_set(&[Action::Write]),
            path.clone(),
        )
        .with_sid(mode_sid)
        .with_condition(
            Condition::new(
                ConditionOperator::StringNotEquals,
                ENCRYPTION_MODE_KEY,
                self.approved_mode.as_str().into(),
            )
            .if_exists(),
        );

        let foreign_key = PolicyRule::new(
            Effect::Deny,
            Principal::Any,
            action_set(&[Action::Write]),
            path,
        )
        .with_sid(key_sid)
        .with_condition(Condition::new(
            ConditionOperator::StringNotEquals,
            ENCRYPTION_KEY_ID_KEY,
            self.key.as_str().into(),
        ));

        [unapproved_mode, foreign_key]
    }

    /// Conditions a grant must carry for its writes to pass the gate
    pub fn compliant_conditions(&self) -> Vec<Condition> {
        vec![
            Condition::new(
                ConditionOperator::StringEquals,
                ENCRYPTION_MODE_KEY,
                self.approved_mode.as_str().into(),
            ),
            Condition::new(
                ConditionOperator::StringEquals,
                ENCRYPTION_KEY_ID_KEY,
                self.key.as_str().into(),
            )
            .if_exists(),
        ]
    }

    /// Whether `conditions` pin a key id other than this container's key
    pub fn names_foreign_key(&self, conditions: &[Condition]) -> bool {
        names_foreign_key(&self.key, conditions)
    }

    /// Request context of a compliant write
    pub fn compliant_context(&self) -> RequestContext {
        RequestContext::new()
            .with(ENCRYPTION_MODE_KEY, self.approved_mode.as_str())
            .with(ENCRYPTION_KEY_ID_KEY, self.key.as_str())
    }

    /// Whether a write declaring `encryption_header` and `key_id` passes
    ///
    /// A missing header fails closed.
    pub fn is_write_compliant(&self, encryption_header: Option<&str>, key_id: Option<&str>) -> bool {
        match encryption_header {
            Some(mode) if mode == self.approved_mode => match key_id {
                Some(k) => k == self.key.as_str(),
                None => true,
            },
            _ => false,
        }
    }
}

/// Whether any `StringEquals` condition on the key id names a key other than `key`
///
/// Grants planned while a container used an older key carry such a
/// condition; their writes can never pass the container's gate.
pub fn names_foreign_key(key: &ResourceId, conditions: &[Condition]) -> bool {
    let expected = ConditionValue::from(key.as_str());
    conditions.iter().any(|c| {
        c.key == ENCRYPTION_KEY_ID_KEY
            && c.operator == ConditionOperator::StringEquals
            && c.values.iter().any(|v| *v != expected)
    })
}
