//! Selector parsing on top of `scraper`
//!
//! Document lookups go through [`scraper::Selector`]. Style rules keep each
//! complex selector of their prelude separately because the cascade needs
//! the specificity of the selector that actually matched.

use std::fmt;

use scraper::error::SelectorErrorKind;
use scraper::selector::{Parser, Simple};
use scraper::{ElementRef, Selector};
use selectors::matching::{
    self, IgnoreNthChildForInvalidation, MatchingContext, MatchingMode, NeedsSelectorFlags,
    QuirksMode,
};
use selectors::parser::{ParseRelative, Selector as ComplexSelector, SelectorList};
use selectors::NthIndexCache;

use crate::errors::SelectorError;

/// Parse a selector group for document lookups.
pub fn parse_selector(selector: &str) -> Result<Selector, SelectorError> {
    if selector.trim().is_empty() {
        return Err(SelectorError::Empty);
    }
    Selector::parse(selector).map_err(|err| SelectorError::Invalid {
        selector: selector.to_string(),
        reason: err.to_string(),
    })
}

/// The selectors of one style rule
#[derive(Clone)]
pub struct RuleSelectors(Vec<ComplexSelector<Simple>>);

impl RuleSelectors {
    pub fn parse(prelude: &str) -> Result<Self, SelectorError> {
        if prelude.trim().is_empty() {
            return Err(SelectorError::Empty);
        }
        let mut input = cssparser::ParserInput::new(prelude);
        let mut parser = cssparser::Parser::new(&mut input);
        SelectorList::parse(&Parser, &mut parser, ParseRelative::No)
            .map(|list| Self(list.0.iter().cloned().collect()))
            .map_err(|err| SelectorError::Invalid {
                selector: prelude.to_string(),
                reason: SelectorErrorKind::from(err).to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Highest specificity among the selectors that match `element`.
    pub fn matching_specificity(&self, element: &ElementRef<'_>) -> Option<u32> {
        let mut cache = NthIndexCache::default();
        let mut context = MatchingContext::new(
            MatchingMode::Normal,
            None,
            &mut cache,
            QuirksMode::NoQuirks,
            NeedsSelectorFlags::No,
            IgnoreNthChildForInvalidation::No,
        );
        self.0
            .iter()
            .filter(|selector| matching::matches_selector(*selector, 0, None, element, &mut context))
            .map(|selector| selector.specificity())
            .max()
    }
}

impl fmt::Debug for RuleSelectors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RuleSelectors").field(&self.0.len()).finish()
    }
}
