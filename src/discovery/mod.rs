// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// Binder schema discovery policies.
pub mod binder;
/// Server executable lookup.
pub mod server;

pub use binder::{BinderLocator, BinderPattern, BinderPolicy, Binders};
pub use server::ServerLocator;
