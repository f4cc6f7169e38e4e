// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Replica-set routing hint attached to commands.
///
/// `Primary` is the wire default and is never spelled out in a command;
/// every other mode travels as a `$readPreference` subdocument. A level
/// (collection, database) that wants to inherit simply carries no
/// preference of its own.
#[derive(Deserialize, Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReadPreference {
    #[default]
    #[serde(rename = "Primary", alias = "primary")]
    Primary,
    #[serde(rename = "PrimaryPreferred", alias = "primaryPreferred")]
    PrimaryPreferred,
    #[serde(rename = "Secondary", alias = "secondary")]
    Secondary,
    #[serde(rename = "SecondaryPreferred", alias = "secondaryPreferred")]
    SecondaryPreferred,
    #[serde(rename = "Nearest", alias = "nearest")]
    Nearest,
}

impl ReadPreference {
    /// The camel-case mode string the server expects.
    pub fn mode_str(self) -> &'static str {
        match self {
            ReadPreference::Primary => "primary",
            ReadPreference::PrimaryPreferred => "primaryPreferred",
            ReadPreference::Secondary => "secondary",
            ReadPreference::SecondaryPreferred => "secondaryPreferred",
            ReadPreference::Nearest => "nearest",
        }
    }
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mode_str())
    }
}
