// SPDX-License-Identifier: GPL-3.0-only

//! Thread-safe owner of the effect chain
//!
//! Every mutation and every snapshot takes the same lock, and the lock is
//! never held while effects run: the processing loop applies a snapshot.

use super::{EffectChain, EffectConfig, EffectKind, EffectParams, ParamValue};
use crate::errors::EffectError;
use parking_lot::Mutex;
use tracing::info;

#[derive(Debug, Default)]
pub struct EffectController {
    chain: Mutex<EffectChain>,
}

impl EffectController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `kind` or update its existing slot in place
    ///
    /// Returns `true` when an existing slot was updated.
    pub fn add_or_update(&self, kind: EffectKind, params: EffectParams) -> Result<bool, EffectError> {
        let updated = self
            .chain
            .lock()
            .add_or_update(EffectConfig::new(kind, params))?;
        info!(kind = %kind, updated, "Effect added to chain");
        Ok(updated)
    }

    /// Replace the whole chain with a single effect
    ///
    /// The new effect is validated first; on failure the chain is unchanged.
    pub fn set(&self, kind: EffectKind, params: EffectParams) -> Result<(), EffectError> {
        let mut replacement = EffectChain::new();
        replacement.add_or_update(EffectConfig::new(kind, params))?;
        *self.chain.lock() = replacement;
        info!(kind = %kind, "Effect chain set");
        Ok(())
    }

    /// Remove the entry at `index`; returns the removed kind, or `None` if out of range
    pub fn remove(&self, index: usize) -> Option<EffectKind> {
        let removed = self.chain.lock().remove(index);
        if let Some(kind) = removed {
            info!(kind = %kind, index, "Effect removed from chain");
        }
        removed
    }

    pub fn remove_by_kind(&self, kind: EffectKind) -> bool {
        let removed = self.chain.lock().remove_by_kind(kind);
        if removed {
            info!(kind = %kind, "Effect removed from chain");
        }
        removed
    }

    pub fn clear(&self) {
        self.chain.lock().clear();
        info!("Effect chain cleared");
    }

    /// Set one parameter of an existing entry
    ///
    /// Fails with [`EffectError::NotFound`] if the chain has no entry of
    /// `kind`. Returns the entry's new parameters.
    pub fn update_parameter(
        &self,
        kind: EffectKind,
        name: &str,
        value: ParamValue,
    ) -> Result<EffectParams, EffectError> {
        let mut chain = self.chain.lock();
        let index = chain
            .position(kind)
            .ok_or_else(|| EffectError::NotFound(kind.to_string()))?;
        let mut params = chain.entries()[index].config.params.clone();
        params.insert(name, value);
        chain.add_or_update(EffectConfig::new(kind, params.clone()))?;
        info!(kind = %kind, param = name, "Effect parameter updated");
        Ok(params)
    }

    /// Copy of the chain, safe to apply without holding the lock
    pub fn snapshot(&self) -> EffectChain {
        self.chain.lock().clone()
    }

    /// (kind, parameters) for every entry, in order
    pub fn current_effects(&self) -> Vec<(EffectKind, EffectParams)> {
        self.chain
            .lock()
            .entries()
            .iter()
            .map(|e| (e.kind, e.config.params.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_parameter_missing_kind() {
        let controller = EffectController::new();
        assert_eq!(
            controller.update_parameter(EffectKind::Blur, "strength", ParamValue::Int(5)),
            Err(EffectError::NotFound("blur".into()))
        );
    }

    #[test]
    fn test_update_parameter_merges_into_existing() {
        let controller = EffectController::new();
        controller
            .add_or_update(
                EffectKind::Brightness,
                EffectParams::new().with("contrast", 1.2),
            )
            .unwrap();
        let params = controller
            .update_parameter(EffectKind::Brightness, "brightness", ParamValue::Int(30))
            .unwrap();
        assert_eq!(params.get("contrast"), Some(&ParamValue::Float(1.2)));
        assert_eq!(params.get("brightness"), Some(&ParamValue::Int(30)));
    }

    #[test]
    fn test_invalid_update_leaves_entry() {
        let controller = EffectController::new();
        controller
            .add_or_update(EffectKind::Blur, EffectParams::new())
            .unwrap();
        assert!(
            controller
                .update_parameter(EffectKind::Blur, "strength", ParamValue::Int(4))
                .is_err()
        );
        assert_eq!(
            controller.current_effects(),
            vec![(EffectKind::Blur, EffectParams::new())]
        );
    }

    #[test]
    fn test_set_replaces_chain() {
        let controller = EffectController::new();
        controller
            .add_or_update(EffectKind::Blur, EffectParams::new())
            .unwrap();
        controller
            .add_or_update(EffectKind::Beautify, EffectParams::new())
            .unwrap();
        controller
            .set(EffectKind::Brightness, EffectParams::new())
            .unwrap();
        assert_eq!(controller.snapshot().kinds(), vec![EffectKind::Brightness]);
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let controller = EffectController::new();
        controller
            .add_or_update(EffectKind::Blur, EffectParams::new())
            .unwrap();
        let snapshot = controller.snapshot();
        controller.clear();
        assert_eq!(snapshot.len(), 1);
        assert!(controller.snapshot().is_empty());
    }
}
