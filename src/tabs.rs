//! Tab-Completion Tracker
//!
//! A submission is filled in over three steps ("tabs"): core identity fields,
//! financial detail, supplementary information. Each flag flips to `true` the
//! first time its step is saved and never flips back.
use std::fmt;

use crate::actor::{Actor, RoleClass};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct TabFlags {
    #[n(0)]
    pub first: bool,
    #[n(1)]
    pub second: bool,
    #[n(2)]
    pub third: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    BasicInfo,
    Financials,
    AdditionalInfo,
}

impl TabFlags {
    /// Mark `tab` done. Returns `true` when this call set the flag.
    pub fn complete(&mut self, tab: Tab) -> bool {
        let flag = match tab {
            Tab::BasicInfo => &mut self.first,
            Tab::Financials => &mut self.second,
            Tab::AdditionalInfo => &mut self.third,
        };
        let newly_set = !*flag;
        *flag = true;
        newly_set
    }

    pub fn is_complete(&self) -> bool {
        self.first && self.second && self.third
    }
}

impl fmt::Display for TabFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{first: {}, second: {}, third: {}}}",
            self.first, self.second, self.third
        )
    }
}

/// What a final-save request should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    /// Transition to approved and stamp the approval time.
    Approve,
    /// Not ready, or not applicable for this actor. Report the flags back.
    Hold(TabFlags),
}

/// Central actors never pass through this gate; their records start approved.
pub fn evaluate(flags: TabFlags, actor: &Actor) -> Finalization {
    match actor.role() {
        RoleClass::Affiliate if flags.is_complete() => Finalization::Approve,
        _ => Finalization::Hold(flags),
    }
}
