// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod cfg;
pub mod client;
pub mod command;
pub mod error;
pub mod models;
pub mod scram;
pub mod state_machine;
