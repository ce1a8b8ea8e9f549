//! Machine operating states and the boolean masks that carry them

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Operating state of the machine at one sample.
///
/// `On` is the union of `Standby` and `Production`; a single sample is always
/// labelled with exactly one of `Off`, `Standby` or `Production`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    Off,
    On,
    Standby,
    Production,
}

impl MachineState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On => "on",
            Self::Standby => "standby",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Four index-aligned boolean masks produced by state classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateMasks {
    pub off: Vec<bool>,
    pub on: Vec<bool>,
    pub standby: Vec<bool>,
    pub production: Vec<bool>,
}

impl StateMasks {
    /// Derive the full mask set from the off and standby decisions.
    ///
    /// `on = !off`, `standby = on && standby_candidate`, `production = on && !standby`.
    pub fn from_decisions(off: Vec<bool>, standby_candidate: &[bool]) -> Self {
        let on: Vec<bool> = off.iter().map(|o| !o).collect();
        let standby: Vec<bool> = on
            .iter()
            .zip(standby_candidate.iter())
            .map(|(&on, &candidate)| on && candidate)
            .collect();
        let production = on
            .iter()
            .zip(standby.iter())
            .map(|(&on, &standby)| on && !standby)
            .collect();
        Self {
            off,
            on,
            standby,
            production,
        }
    }

    pub fn len(&self) -> usize {
        self.off.len()
    }

    pub fn is_empty(&self) -> bool {
        self.off.is_empty()
    }

    pub fn mask(&self, state: MachineState) -> &[bool] {
        match state {
            MachineState::Off => &self.off,
            MachineState::On => &self.on,
            MachineState::Standby => &self.standby,
            MachineState::Production => &self.production,
        }
    }

    /// Final label at `index`: `Off`, `Standby` or `Production`.
    pub fn label_at(&self, index: usize) -> Option<MachineState> {
        if index >= self.len() {
            return None;
        }
        Some(if self.production[index] {
            MachineState::Production
        } else if self.standby[index] {
            MachineState::Standby
        } else if self.on[index] {
            MachineState::On
        } else {
            MachineState::Off
        })
    }

    pub fn labels(&self) -> Vec<MachineState> {
        (0..self.len()).filter_map(|i| self.label_at(i)).collect()
    }

    /// True when every sample holds exactly one of off/standby/production and
    /// `on == standby || production`.
    pub fn is_partition(&self) -> bool {
        let n = self.len();
        if self.on.len() != n || self.standby.len() != n || self.production.len() != n {
            return false;
        }
        (0..n).all(|i| {
            let exclusive = usize::from(self.off[i])
                + usize::from(self.standby[i])
                + usize::from(self.production[i]);
            exclusive == 1
                && self.on[i] == !self.off[i]
                && self.on[i] == (self.standby[i] || self.production[i])
        })
    }

    pub fn distribution(&self) -> StateDistribution {
        let mut counts = BTreeMap::new();
        for label in self.labels() {
            *counts.entry(label).or_insert(0) += 1;
        }
        StateDistribution { counts }
    }
}

/// Number of samples per final state label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDistribution {
    counts: BTreeMap<MachineState, usize>,
}

impl StateDistribution {
    pub fn count(&self, state: MachineState) -> usize {
        self.counts.get(&state).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MachineState, usize)> + '_ {
        self.counts.iter().map(|(&state, &count)| (state, count))
    }
}
