//! Source registry mapping source names to descriptors and crawlers.

use std::collections::BTreeMap;

use crate::sources::{cnyes, ctee, faoi, mgts, moneyudn, ptt, taifex, tdcc, tpex, twse, SourceCrawler};
use crate::types::SourceDescriptor;

/// A registered source.
pub struct Entry {
    pub descriptor: &'static SourceDescriptor,
    pub crawler: Box<dyn SourceCrawler>,
}

/// Registry of crawlable sources, keyed and iterated by name.
pub struct Registry {
    entries: BTreeMap<&'static str, Entry>,
}

impl Registry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registry with every built-in source.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(&twse::DESCRIPTOR, twse::TwseCrawler);
        registry.register(&tpex::DESCRIPTOR, tpex::TpexCrawler);
        registry.register(&taifex::DESCRIPTOR, taifex::TaifexCrawler);
        registry.register(&faoi::DESCRIPTOR, faoi::FaoiCrawler);
        registry.register(&mgts::DESCRIPTOR, mgts::MgtsCrawler);
        registry.register(&tdcc::DESCRIPTOR, tdcc::TdccCrawler);
        registry.register(&cnyes::DESCRIPTOR, cnyes::CnyesCrawler);
        registry.register(&ptt::DESCRIPTOR, ptt::PttCrawler);
        registry.register(&ctee::DESCRIPTOR, ctee::CteeCrawler);
        registry.register(&moneyudn::DESCRIPTOR, moneyudn::MoneyUdnCrawler);
        registry
    }

    /// Register a crawler under its descriptor's name, replacing any previous one.
    pub fn register(&mut self, descriptor: &'static SourceDescriptor, crawler: impl SourceCrawler + 'static) {
        self.entries.insert(
            descriptor.name,
            Entry {
                descriptor,
                crawler: Box::new(crawler),
            },
        );
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn has_source(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Descriptors in name order.
    pub fn descriptors(&self) -> impl Iterator<Item = &'static SourceDescriptor> + '_ {
        self.entries.values().map(|entry| entry.descriptor)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}
