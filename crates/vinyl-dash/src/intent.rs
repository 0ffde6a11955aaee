//! Optimistic values awaiting reconciliation with the device.
//!
//! When the user moves a control we show the new value right away, but the
//! device is the only authority.  The next status refresh always wins,
//! whether or not it agrees with what we guessed.
//!
//! # States
//! ```text
//!  Unknown                     : nothing heard from the device yet
//!  Confirmed(T)                : last value read back from the device
//!  Provisional { guess, .. }   : shown while a command is outstanding
//! ```

/// Display value for one device setting.
#[derive(Debug, Clone, PartialEq)]
pub enum Provisional<T: Clone + PartialEq> {
    Unknown,
    Confirmed(T),
    Provisional {
        guess: T,
        confirmed: Option<T>,
    },
}

impl<T: Clone + PartialEq> Default for Provisional<T> {
    fn default() -> Self {
        Self::Unknown
    }
}

impl<T: Clone + PartialEq> Provisional<T> {
    /// The value to render: the guess if one is outstanding, else the confirmed one.
    pub fn displayed(&self) -> Option<&T> {
        match self {
            Self::Unknown => None,
            Self::Confirmed(v) => Some(v),
            Self::Provisional { guess, .. } => Some(guess),
        }
    }

    /// The last value read back from the device.
    pub fn confirmed(&self) -> Option<&T> {
        match self {
            Self::Unknown => None,
            Self::Confirmed(v) => Some(v),
            Self::Provisional { confirmed, .. } => confirmed.as_ref(),
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional { .. })
    }

    /// Record a local guess ahead of the command round trip.
    pub fn guess(&mut self, value: T) {
        let confirmed = self.confirmed().cloned();
        *self = Self::Provisional {
            guess: value,
            confirmed,
        };
    }

    /// Authoritative value from a device refresh.  Unconditionally replaces
    /// any outstanding guess.  Returns `true` if the displayed value changed.
    pub fn confirm(&mut self, value: T) -> bool {
        let changed = self.displayed() != Some(&value);
        *self = Self::Confirmed(value);
        changed
    }

    /// Drop the guess and fall back to the last confirmed value.
    pub fn revert(&mut self) {
        *self = match self.confirmed().cloned() {
            Some(v) => Self::Confirmed(v),
            None => Self::Unknown,
        };
    }
}
