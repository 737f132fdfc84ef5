pub mod bets;
pub mod loopback;
pub mod static_answers;

pub use bets::Bets;
pub use loopback::Loopback;
pub use static_answers::{StaticAnswer, StaticAnswerEntry};

use anyhow::Result;
use tracing::info;

use crate::{
    config::BotConfig,
    feature::{SharedFeature, shared},
};

/// Build every feature the configuration asks for.
pub fn from_config(config: &BotConfig) -> Result<Vec<SharedFeature>> {
    let identity = config.identity();
    let mut features: Vec<SharedFeature> = vec![shared(Bets::new(identity.clone(), &config.owner))];

    if let Some(path) = &config.answers_file {
        let entries = static_answers::load_answers(path)?;
        info!(count = entries.len(), file = %path.display(), "loaded static answers");
        features.extend(
            entries
                .into_iter()
                .map(|entry| shared(StaticAnswer::new(entry, identity.clone()))),
        );
    }

    if let Some(trigger) = &config.loopback_trigger {
        features.push(shared(Loopback::new(identity.clone(), trigger)));
    }

    Ok(features)
}
