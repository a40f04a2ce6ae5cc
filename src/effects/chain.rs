// SPDX-License-Identifier: GPL-3.0-only

//! Ordered effect chain

use super::instance::EffectInstance;
use super::settings::EffectSettings;
use super::{EffectConfig, EffectKind, EffectParams, Mask, ParamValue};
use crate::backends::camera::types::Frame;
use crate::errors::EffectError;
use std::sync::Arc;
use tracing::debug;

/// One slot of the chain
///
/// Config and instance are shared, so cloning an entry (and therefore a
/// whole chain) copies only pointers.
#[derive(Debug, Clone)]
pub struct ChainEntry {
    pub kind: EffectKind,
    pub config: Arc<EffectConfig>,
    pub instance: Arc<EffectInstance>,
}

/// Whether an entry of `kind` with the given merged parameters receives the mask
pub fn receives_mask(kind: EffectKind, params: &EffectParams) -> bool {
    kind.is_mask_dependent()
        || (kind == EffectKind::Brightness
            && params
                .get("face_only")
                .and_then(ParamValue::as_bool)
                .unwrap_or(false))
}

/// Effects applied in order, at most one per kind
#[derive(Debug, Clone, Default)]
pub struct EffectChain {
    entries: Vec<ChainEntry>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn position(&self, kind: EffectKind) -> Option<usize> {
        self.entries.iter().position(|e| e.kind == kind)
    }

    pub fn contains(&self, kind: EffectKind) -> bool {
        self.position(kind).is_some()
    }

    /// Kinds in chain order
    pub fn kinds(&self) -> Vec<EffectKind> {
        self.entries.iter().map(|e| e.kind).collect()
    }

    /// Replace the slot of `config.kind` in place, or append a new one
    ///
    /// The instance is built before the chain is touched, so a rejected
    /// config leaves the chain unchanged. Returns `true` if an existing slot
    /// was updated.
    pub fn add_or_update(&mut self, config: EffectConfig) -> Result<bool, EffectError> {
        let instance = Arc::new(EffectInstance::build(&config)?);
        let kind = config.kind;
        let entry = ChainEntry {
            kind,
            config: Arc::new(config),
            instance,
        };
        match self.position(kind) {
            Some(index) => {
                debug!(kind = %kind, index, "Updating effect in place");
                self.entries[index] = entry;
                Ok(true)
            }
            None => {
                debug!(kind = %kind, index = self.entries.len(), "Appending effect");
                self.entries.push(entry);
                Ok(false)
            }
        }
    }

    /// Remove the entry at `index`; out-of-range indices are ignored
    pub fn remove(&mut self, index: usize) -> Option<EffectKind> {
        (index < self.entries.len()).then(|| self.entries.remove(index).kind)
    }

    /// Remove the entry of `kind`, returning whether one existed
    pub fn remove_by_kind(&mut self, kind: EffectKind) -> bool {
        match self.position(kind) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether any entry needs the segmentation mask
    pub fn needs_mask(&self) -> bool {
        self.entries
            .iter()
            .any(|e| receives_mask(e.kind, &e.config.params))
    }

    /// Apply every entry in order
    ///
    /// Each entry runs with its stored parameters merged with `overrides`
    /// (overrides win). Only mask-dependent entries, and brightness with
    /// `face_only`, are given the mask; every such entry sees the same mask.
    pub fn apply(
        &self,
        frame: Frame,
        mask: Option<&Mask>,
        overrides: &EffectParams,
    ) -> Result<Frame, EffectError> {
        let mut frame = frame;
        for entry in &self.entries {
            let merged = entry.config.params.merged(overrides);
            let settings = EffectSettings::parse(entry.kind, &merged)?;
            let routed = if receives_mask(entry.kind, &merged) {
                mask
            } else {
                None
            };
            frame = entry.instance.apply(&settings, frame, routed)?;
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: EffectKind) -> EffectConfig {
        EffectConfig::new(kind, EffectParams::new())
    }

    #[test]
    fn test_update_keeps_position() {
        let mut chain = EffectChain::new();
        chain.add_or_update(config(EffectKind::Blur)).unwrap();
        chain.add_or_update(config(EffectKind::Brightness)).unwrap();
        chain.add_or_update(config(EffectKind::Beautify)).unwrap();

        let updated = chain
            .add_or_update(EffectConfig::new(
                EffectKind::Brightness,
                EffectParams::new().with("brightness", 40),
            ))
            .unwrap();

        assert!(updated);
        assert_eq!(
            chain.kinds(),
            vec![EffectKind::Blur, EffectKind::Brightness, EffectKind::Beautify]
        );
        assert_eq!(
            chain.entries()[1].config.params.get("brightness"),
            Some(&ParamValue::Int(40))
        );
    }

    #[test]
    fn test_rejected_config_leaves_chain() {
        let mut chain = EffectChain::new();
        chain
            .add_or_update(EffectConfig::new(
                EffectKind::Blur,
                EffectParams::new().with("strength", 15),
            ))
            .unwrap();
        let err = chain.add_or_update(EffectConfig::new(
            EffectKind::Blur,
            EffectParams::new().with("strength", 16),
        ));
        assert!(err.is_err());
        assert_eq!(
            chain.entries()[0].config.params.get("strength"),
            Some(&ParamValue::Int(15))
        );
    }

    #[test]
    fn test_remove_out_of_range_is_noop() {
        let mut chain = EffectChain::new();
        chain.add_or_update(config(EffectKind::Blur)).unwrap();
        assert_eq!(chain.remove(5), None);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.remove(0), Some(EffectKind::Blur));
        assert!(chain.is_empty());
    }

    #[test]
    fn test_needs_mask() {
        let mut chain = EffectChain::new();
        chain.add_or_update(config(EffectKind::Brightness)).unwrap();
        assert!(!chain.needs_mask());
        chain
            .add_or_update(EffectConfig::new(
                EffectKind::Brightness,
                EffectParams::new().with("face_only", true),
            ))
            .unwrap();
        assert!(chain.needs_mask());
        chain.clear();
        chain.add_or_update(config(EffectKind::Blur)).unwrap();
        assert!(chain.needs_mask());
    }
}
