// Copyright 2016 TMQ contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

// Patterns are the content address that replaces string topics: an ordered
// tuple of u32 tokens, equal by tuple equality.

use crate::codec::hash;

/// An ordered tuple of up to 255 u32 tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Pattern(pub Vec<u32>);

impl Pattern {
    pub fn new(tokens: Vec<u32>) -> Pattern {
        Pattern(tokens)
    }

    pub fn tokens(&self) -> &[u32] {
        &self.0
    }

    /// Derive a pattern from names via the standard string hash.
    pub fn from_names(names: &[&str]) -> Pattern {
        Pattern(names.iter().map(|n| hash(n)).collect())
    }
}

impl From<Vec<u32>> for Pattern {
    fn from(tokens: Vec<u32>) -> Pattern {
        Pattern(tokens)
    }
}

impl<const N: usize> From<[u32; N]> for Pattern {
    fn from(tokens: [u32; N]) -> Pattern {
        Pattern(tokens.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_names_matches_manual_hash() {
        let p = Pattern::from_names(&["test", "pattern"]);
        assert_eq!(p, Pattern(vec![hash("test"), hash("pattern")]));
    }

    #[test]
    fn equality_is_by_tuple() {
        assert_eq!(Pattern::from([0u32, 1]), Pattern::from([0u32, 1]));
        assert_ne!(Pattern::from([0u32, 1]), Pattern::from([1u32, 0]));
    }
}
