use std::sync::Arc;

use log::Logger;

use crate::audio::{Speed, Voice};
use crate::db::Db;
use crate::generation::SafeGenerator;
use crate::urls::Urls;

/// Everything a request handler needs, created once at startup.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub db: Arc<dyn Db + Send + Sync>,

    /// `None` when no generation credential was configured.
    pub generator: Option<Arc<SafeGenerator>>,
    pub urls: Arc<Urls>,
    pub config: Config,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<dyn Db + Send + Sync>,
        generator: Option<Arc<SafeGenerator>>,
        urls: Arc<Urls>,
        config: Config,
    ) -> Self {
        Self {
            logger,
            db,
            generator,
            urls,
            config,
        }
    }

    pub fn generator(&self) -> Option<&SafeGenerator> {
        self.generator.as_deref()
    }
}

/// Defaults applied to synthesis requests that leave them out.
#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    pub(crate) default_voice: Voice,
    pub(crate) default_speed: Speed,
}

impl Config {
    pub fn new(default_voice: Voice, default_speed: Speed) -> Self {
        Self {
            default_voice,
            default_speed,
        }
    }
}
