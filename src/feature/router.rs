// src/feature/router.rs

use std::{collections::HashMap, sync::Arc};

use chat_channel::message::ChatMessage;
use tracing::{debug, error, info, warn};

use super::{Responder, SharedFeature, lock_feature};

/// Bucket key of the features that see every message.
const ALWAYS: &str = "";

/// Find the command word of a chat line: `!Bet open` → `bet`.
///
/// There is no trigger if the text does not start with `!`, if a space
/// follows the `!` directly, or if the `!` stands alone.
pub fn extract_trigger(text: &str) -> Option<String> {
    let rest = text.strip_prefix('!')?;
    if rest.starts_with(' ') {
        return None;
    }
    let word = rest.split(' ').next().unwrap_or_default();
    if word.is_empty() {
        None
    } else {
        Some(word.to_lowercase())
    }
}

/// Owns the trigger → features registry and fans messages out to it.
pub struct FeatureRouter {
    buckets: HashMap<String, Vec<SharedFeature>>,
    responder: Responder,
}

impl FeatureRouter {
    /// Every registered feature gets a clone of `responder`.
    pub fn new(responder: Responder) -> Self {
        Self {
            buckets: HashMap::new(),
            responder,
        }
    }

    /// Set the feature up and wire it to its trigger. Returns `false` if the
    /// feature has no trigger and will never be called.
    ///
    /// Registering the same feature twice does not make it run twice.
    pub fn register(&mut self, feature: SharedFeature) -> bool {
        let (name, trigger) = {
            let mut guard = lock_feature(&feature);
            guard.setup(self.responder.clone());
            (guard.name().to_string(), guard.trigger().map(str::to_string))
        };

        let Some(trigger) = trigger else {
            warn!(feature = %name, "a feature without a trigger was registered");
            return false;
        };

        let trigger = trigger.trim().to_lowercase();
        let bucket = self.buckets.entry(trigger.clone()).or_default();
        if bucket.iter().any(|known| Arc::ptr_eq(known, &feature)) {
            debug!(feature = %name, %trigger, "feature already registered");
        } else {
            info!(feature = %name, %trigger, "feature registered");
            bucket.push(feature);
        }
        true
    }

    /// Dispatch `message` to the always-bucket, then to the bucket of its
    /// trigger, each in registration order.
    pub fn process(&self, message: &ChatMessage) {
        self.invoke(ALWAYS, message);

        if let Some(trigger) = extract_trigger(&message.text) {
            self.invoke(&trigger, message);
        }
    }

    fn invoke(&self, key: &str, message: &ChatMessage) {
        let Some(bucket) = self.buckets.get(key) else {
            return;
        };
        for feature in bucket {
            let mut guard = lock_feature(feature);
            if let Err(e) = guard.act(message) {
                error!(feature = guard.name(), "feature failed on `{}`: {e:#}", message.text);
            }
        }
    }

    /// Registered trigger words, the always-bucket included as `""`.
    pub fn triggers(&self) -> Vec<&str> {
        let mut triggers: Vec<&str> = self.buckets.keys().map(String::as_str).collect();
        triggers.sort_unstable();
        triggers
    }

    pub fn feature_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}
