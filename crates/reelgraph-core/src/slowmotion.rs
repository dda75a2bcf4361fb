//! Shared speed-altered producers.
//!
//! Each distinct producer is a separate decode pipeline in the engine, so
//! every clip playing the same source at the same speed and strobe must share
//! one variant. Keys and resource descriptors are pure functions of their
//! inputs, formatted canonically so lookups never depend on how a caller
//! spelled the speed.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    backend::{ProducerHandle, RenderBackend},
    error::{EditError, Unavailable},
    model::Source,
    time::FramePos,
};

/// A handle to a producer obtained through the cache. Identity-speed
/// acquisitions hand back the source producer itself.
pub type VariantHandle = ProducerHandle;

/// Canonical speed text: six decimals, trailing zeros and dot trimmed.
///
/// ```
/// use reelgraph_core::slowmotion::format_speed;
/// assert_eq!(format_speed(0.5), "0.5");
/// assert_eq!(format_speed(2.0), "2");
/// assert_eq!(format_speed(-1.0), "-1");
/// assert_eq!(format_speed(0.333_333_4), "0.333333");
/// ```
#[must_use]
pub fn format_speed(speed: f64) -> String {
    let text = format!("{speed:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

/// `slowmotion:{source_id}:{speed}:{strobe}`
#[must_use]
pub fn variant_key(source_id: &str, speed: f64, strobe: u32) -> String {
    format!("slowmotion:{source_id}:{}:{strobe}", format_speed(speed))
}

/// `framebuffer:{resource}?{speed}`, with `&strobe={n}` when strobing.
#[must_use]
pub fn variant_resource(resource: &str, speed: f64, strobe: u32) -> String {
    let mut descriptor = format!("framebuffer:{resource}?{}", format_speed(speed));
    if strobe > 1 {
        descriptor.push_str(&format!("&strobe={strobe}"));
    }
    descriptor
}

#[must_use]
pub fn is_identity(speed: f64, strobe: u32) -> bool {
    strobe == 1 && format_speed(speed) == "1"
}

/// Frames available from `source_length` played at `speed`.
#[must_use]
pub fn variant_length(source_length: FramePos, speed: f64) -> FramePos {
    if is_identity(speed, 1) {
        return source_length;
    }
    FramePos((source_length.0 as f64 / speed.abs()).round() as i64)
}

pub fn validate_speed(speed: f64, strobe: u32) -> Result<(), EditError> {
    if !speed.is_finite() || format_speed(speed) == "0" {
        return Err(EditError::invalid_range(format!(
            "speed {speed} is not playable"
        )));
    }
    if strobe == 0 {
        return Err(EditError::invalid_range("strobe must be at least 1"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantInfo {
    pub key: String,
    pub resource: String,
    pub handle: ProducerHandle,
    pub references: usize,
}

#[derive(Debug, Clone)]
struct Variant {
    resource: String,
    handle: ProducerHandle,
    references: usize,
}

#[derive(Debug, Default)]
pub struct SlowMotionCache {
    variants: BTreeMap<String, Variant>,
    keys: HashMap<ProducerHandle, String>,
}

impl SlowMotionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    #[must_use]
    pub fn is_variant(&self, handle: ProducerHandle) -> bool {
        self.keys.contains_key(&handle)
    }

    #[must_use]
    pub fn references(&self, handle: ProducerHandle) -> usize {
        self.keys
            .get(&handle)
            .and_then(|key| self.variants.get(key))
            .map_or(0, |variant| variant.references)
    }

    #[must_use]
    pub fn entries(&self) -> Vec<VariantInfo> {
        self.variants
            .iter()
            .map(|(key, variant)| VariantInfo {
                key: key.clone(),
                resource: variant.resource.clone(),
                handle: variant.handle,
                references: variant.references,
            })
            .collect()
    }

    /// Returns the shared producer for `(source, speed, strobe)`, building it
    /// on first use. `source_producer` is returned unchanged for identity
    /// speed.
    pub fn acquire(
        &mut self,
        backend: &mut dyn RenderBackend,
        source: &Source,
        source_producer: ProducerHandle,
        speed: f64,
        strobe: u32,
    ) -> Result<VariantHandle, EditError> {
        validate_speed(speed, strobe)?;
        if is_identity(speed, strobe) {
            return Ok(source_producer);
        }

        let key = variant_key(&source.id, speed, strobe);
        if let Some(variant) = self.variants.get_mut(&key) {
            variant.references += 1;
            debug!(%key, references = variant.references, "slow-motion variant reused");
            return Ok(variant.handle);
        }

        let resource = variant_resource(source.resource_in_use(), speed, strobe);
        let handle = backend.create_producer(&resource).map_err(|error| {
            EditError::ProducerUnavailable {
                source_id: source.id.clone(),
                reason: Unavailable::from(error),
            }
        })?;
        info!(%key, %handle, "slow-motion variant created");
        self.keys.insert(handle, key.clone());
        self.variants.insert(
            key,
            Variant {
                resource,
                handle,
                references: 1,
            },
        );
        Ok(handle)
    }

    /// Takes one more reference on an already-acquired handle, e.g. when a
    /// clip is split in two. No-op for source producers.
    pub fn retain(&mut self, handle: ProducerHandle) {
        if let Some(variant) = self
            .keys
            .get(&handle)
            .and_then(|key| self.variants.get_mut(key))
        {
            variant.references += 1;
        }
    }

    /// Drops one reference. Returns `true` if the variant was torn down.
    pub fn release(
        &mut self,
        backend: &mut dyn RenderBackend,
        handle: ProducerHandle,
    ) -> Result<bool, EditError> {
        let Some(key) = self.keys.get(&handle).cloned() else {
            return Ok(false);
        };
        let Some(variant) = self.variants.get_mut(&key) else {
            return Ok(false);
        };

        variant.references = variant.references.saturating_sub(1);
        if variant.references > 0 {
            debug!(%key, references = variant.references, "slow-motion variant released");
            return Ok(false);
        }

        self.variants.remove(&key);
        self.keys.remove(&handle);
        backend.destroy_producer(handle)?;
        info!(%key, %handle, "slow-motion variant torn down");
        Ok(true)
    }

    /// Tears down every variant regardless of references.
    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        for (key, variant) in std::mem::take(&mut self.variants) {
            if let Err(error) = backend.destroy_producer(variant.handle) {
                warn!(%key, ?error, "failed to destroy slow-motion variant");
            }
        }
        self.keys.clear();
    }
}
