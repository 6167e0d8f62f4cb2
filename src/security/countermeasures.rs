// src/security/countermeasures.rs
//! Countermeasure actuation
//!
//! The threat engine only tracks which measures are active. Putting them
//! into effect on the host belongs to an actuator.

use crate::security::threat_engine::Countermeasure;
use crate::utils::errors::Result;
use tracing::{info, warn};

/// Applies and releases countermeasures on the host
pub trait CountermeasureActuator: Send {
    fn apply(&mut self, measure: Countermeasure) -> Result<()>;

    fn release(&mut self, measure: Countermeasure) -> Result<()>;
}

/// Actuator that records each action in the log
#[derive(Debug, Clone, Default)]
pub struct LoggingActuator {
    applied: Vec<Countermeasure>,
}

impl LoggingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measures applied so far, in order
    pub fn applied(&self) -> &[Countermeasure] {
        &self.applied
    }
}

impl CountermeasureActuator for LoggingActuator {
    fn apply(&mut self, measure: Countermeasure) -> Result<()> {
        match measure {
            Countermeasure::Lockdown => warn!("lockdown protocol engaged"),
            Countermeasure::IsolateNetwork => warn!("network isolation requested"),
            Countermeasure::SuspendNonCritical => warn!("suspending non-critical processes"),
            Countermeasure::FreezeAssets => info!("content assets frozen (read-only)"),
            Countermeasure::EnableLogging => info!("enhanced logging enabled"),
            Countermeasure::BackupCritical => info!("critical data backup initiated"),
            Countermeasure::EnhancedMonitoring => info!("enhanced monitoring enabled"),
            Countermeasure::ProcessRestrictions => info!("process creation restrictions enabled"),
        }
        self.applied.push(measure);
        Ok(())
    }

    fn release(&mut self, measure: Countermeasure) -> Result<()> {
        info!(%measure, "countermeasure released");
        self.applied.retain(|applied| *applied != measure);
        Ok(())
    }
}
