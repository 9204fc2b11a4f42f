/*
 * mailcore - utils module
 *
 * Copyright 2024 mailcore contributors
 *
 * This file is part of mailcore.
 *
 * mailcore is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * mailcore is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with mailcore. If not, see <http://www.gnu.org/licenses/>.
 */

//! Utility modules for general use.

pub mod datetime;
#[macro_use]
pub mod logging;

/// Returns `true` if `s` contains no uppercase characters.
///
/// Regular expressions and literals compiled from such strings match
/// case-insensitively ("smartcase").
pub fn is_lower(s: &str) -> bool {
    !s.chars().any(char::is_uppercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_lower() {
        assert!(is_lower("alice@example.com"));
        assert!(is_lower(""));
        assert!(!is_lower("Alice"));
    }
}
