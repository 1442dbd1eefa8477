/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! CLI utilities for terminal output formatting and colors.

use crossterm::tty::IsTty;
use std::io::stdout;

/// Configuration for color output
#[derive(Debug, Clone)]
pub struct ColorConfig {
    pub enabled: bool,
}

impl ColorConfig {
    /// Create a new ColorConfig, auto-detecting TTY unless nocolor is true
    pub fn new(nocolor: bool) -> Self {
        Self {
            enabled: !nocolor && stdout().is_tty(),
        }
    }

    fn paint(&self, code: &str, s: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{s}\x1b[0m")
        } else {
            s.to_string()
        }
    }

    /// Green, for things that were found
    pub fn green(&self, s: &str) -> String {
        self.paint("32", s)
    }

    /// Red, for missing pieces and errors
    pub fn red(&self, s: &str) -> String {
        self.paint("31", s)
    }

    /// Yellow, for optional pieces that are absent
    pub fn yellow(&self, s: &str) -> String {
        self.paint("33", s)
    }

    /// Cyan, for paths
    pub fn cyan(&self, s: &str) -> String {
        self.paint("36", s)
    }

    /// Dim text
    pub fn dim(&self, s: &str) -> String {
        self.paint("2", s)
    }

    /// Bold text
    pub fn bold(&self, s: &str) -> String {
        self.paint("1", s)
    }

    /// Check mark or cross depending on `ok`.
    pub fn mark(&self, ok: bool) -> String {
        if ok {
            self.green("\u{2713}")
        } else {
            self.red("\u{2717}")
        }
    }
}
