//! Parsing of the free-text product description field.
//!
//! Each order row in a purchase report carries one human-readable
//! description covering every product in the order, e.g.:
//!
//! ```text
//! 1x Myth Realized (Dragons of Tarkir) - 26 - Rare - MT - English - Foil - 4,99 EUR
//! ```
//!
//! Orders with several products join the per-product segments with `" | "`.
//! [`split_segments`] recovers the segments and [`DescriptionParser`] turns
//! each one into a [`LineItem`]. The extraction rules are independent and
//! total: a rule that does not match leaves its field empty instead of
//! failing the segment, so every segment always produces a row.

use regex::Regex;

use std::{fmt::Display, sync::OnceLock};

use crate::price::Price;

/// Set names are occasionally prefixed with the game title on dual-branded
/// products; the prefix carries no information.
const GAME_PREFIX: &str = "Magic: The Gathering | ";

/// Condition grade assigned by the marketplace, best first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Quality {
    Mint,
    NearMint,
    Excellent,
    Good,
    LightPlayed,
    Played,
    Poor,
    /// Products without a condition grade, such as sleeves.
    #[default]
    NotApplicable,
}

impl Quality {
    const CODES: [(&'static str, Self); 7] = [
        ("MT", Self::Mint),
        ("NM", Self::NearMint),
        ("EX", Self::Excellent),
        ("GD", Self::Good),
        ("LP", Self::LightPlayed),
        ("PL", Self::Played),
        ("PO", Self::Poor),
    ];

    /// The two-letter marketplace code, or `N/A`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Mint => "MT",
            Self::NearMint => "NM",
            Self::Excellent => "EX",
            Self::Good => "GD",
            Self::LightPlayed => "LP",
            Self::Played => "PL",
            Self::Poor => "PO",
            Self::NotApplicable => "N/A",
        }
    }

    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::CODES
            .into_iter()
            .find_map(|(c, quality)| (c == code).then_some(quality))
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Print language, as spelled in report descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Language {
    English,
    German,
    French,
    Italian,
    Spanish,
    Japanese,
    SimplifiedChinese,
    TraditionalChinese,
    Korean,
    Portuguese,
    Russian,
}

impl Language {
    const NAMES: [(&'static str, Self); 11] = [
        ("English", Self::English),
        ("German", Self::German),
        ("French", Self::French),
        ("Italian", Self::Italian),
        ("Spanish", Self::Spanish),
        ("Japanese", Self::Japanese),
        ("Simplified Chinese", Self::SimplifiedChinese),
        ("Traditional Chinese", Self::TraditionalChinese),
        ("Korean", Self::Korean),
        ("Portuguese", Self::Portuguese),
        ("Russian", Self::Russian),
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        Self::NAMES
            .into_iter()
            .find_map(|(name, language)| (language == self).then_some(name))
            .expect("every language is named")
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .into_iter()
            .find_map(|(n, language)| (n == name).then_some(language))
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One product line within an order description.
///
/// Every field is independently optional; a segment the rules cannot read
/// still produces an item with the unread fields empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineItem {
    pub quantity: Option<u32>,
    pub product_name: Option<String>,
    pub set_name: Option<String>,
    pub unit_price: Option<Price>,
    /// `quantity × unit_price`; absent unless both factors are known.
    pub total_price: Option<Price>,
    pub quality: Quality,
    pub language: Option<Language>,
    pub foil: bool,
}

fn quantity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)x\b").expect("quantity pattern"))
}

fn quality_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" - (MT|NM|EX|GD|LP|PL|PO) - ").expect("quality pattern"))
}

fn language_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(English|German|French|Italian|Spanish|Japanese|Simplified Chinese|Traditional Chinese|Korean|Portuguese|Russian)\b",
        )
        .expect("language pattern")
    })
}

/// Splits a description into product segments on `" | "`, ignoring
/// separators inside parentheses: set names may contain the separator
/// themselves, and a segment never spans a parenthesis boundary.
#[must_use]
pub fn split_segments(description: &str) -> Vec<&str> {
    const SEPARATOR: &str = " | ";
    let bytes = description.as_bytes();
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b' ' if depth == 0 && description[i..].starts_with(SEPARATOR) => {
                segments.push(description[start..i].trim());
                i += SEPARATOR.len();
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    segments.push(description[start..].trim());
    segments.retain(|segment| !segment.is_empty());
    segments
}

/// The outermost trailing parenthesized group of `segment`, with the byte
/// offset of its opening parenthesis.
///
/// Walks backwards from the last `)` to its balanced `(`, so set names with
/// nested parentheses (dual-printed tokens, anthology sets) come back whole.
fn trailing_parenthesized(segment: &str) -> Option<(usize, &str)> {
    let close = segment.rfind(')')?;
    let mut depth = 0usize;
    for (i, c) in segment[..=close].char_indices().rev() {
        match c {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    return Some((i, &segment[i + 1..close]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Segment parser for a single report currency.
///
/// The unit-price rule depends on the report's currency code, so the parser
/// is compiled once per currency and reused across rows.
#[derive(Debug)]
pub struct DescriptionParser {
    price: Regex,
}

impl DescriptionParser {
    #[must_use]
    pub fn new(currency: &str) -> Self {
        let pattern = format!(r"- ([\d.,]+) {}", regex::escape(currency));
        Self {
            price: Regex::new(&pattern).expect("price pattern"),
        }
    }

    /// Parses a full description field into one [`LineItem`] per segment.
    #[must_use]
    pub fn parse(&self, description: &str) -> Vec<LineItem> {
        split_segments(description)
            .into_iter()
            .map(|segment| self.parse_segment(segment))
            .collect()
    }

    fn parse_segment(&self, segment: &str) -> LineItem {
        let quantity = quantity(segment);
        let set = trailing_parenthesized(segment);
        let set_name = set.map(|(_, name)| {
            let name = name.trim();
            name.strip_prefix(GAME_PREFIX).unwrap_or(name).to_string()
        });
        let product_name = product_name(segment, set.map(|(start, _)| start));
        let unit_price = self.unit_price(segment);
        let total_price = match (quantity, unit_price) {
            (Some(quantity), Some(unit)) => Some(unit * i64::from(quantity)),
            _ => None,
        };
        LineItem {
            quantity,
            product_name,
            set_name,
            unit_price,
            total_price,
            quality: quality(segment),
            language: language(segment),
            foil: segment.contains(" - Foil - "),
        }
    }

    fn unit_price(&self, segment: &str) -> Option<Price> {
        self.price.captures(segment)?.get(1)?.as_str().parse().ok()
    }
}

fn quantity(segment: &str) -> Option<u32> {
    quantity_re().captures(segment)?.get(1)?.as_str().parse().ok()
}

/// The product name sits between the quantity token and the set-name group,
/// so names containing their own parenthesized tokens survive intact.
fn product_name(segment: &str, set_start: Option<usize>) -> Option<String> {
    let start = quantity_re().find(segment).map_or(0, |m| m.end());
    let end = set_start?;
    if end <= start {
        return None;
    }
    let name = segment[start..end].trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn quality(segment: &str) -> Quality {
    quality_re()
        .captures(segment)
        .and_then(|c| c.get(1))
        .and_then(|m| Quality::from_code(m.as_str()))
        .unwrap_or_default()
}

fn language(segment: &str) -> Option<Language> {
    Language::from_name(language_re().find(segment)?.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_segments_fn_splits_on_the_separator() {
        let segments = split_segments("1x A (S) - NM - 1,00 EUR | 2x B (T) - EX - 2,00 EUR");
        assert_eq!(segments.len(), 2);
        assert!(segments[0].starts_with("1x A"));
        assert!(segments[1].starts_with("2x B"));
    }

    #[test]
    fn split_segments_fn_ignores_separators_inside_parentheses() {
        // The set name carries the game-title prefix, separator included;
        // the description must still come apart into exactly two segments.
        let description = "2x Plains (Magic: The Gathering | Theros) - 230 - NM - English - 0,05 EUR \
                           | 1x Island (Theros) - 231 - NM - English - 0,05 EUR";
        let segments = split_segments(description);
        assert_eq!(segments.len(), 2, "got: {segments:?}");
    }

    #[test]
    fn parse_fn_reads_a_plain_single_card() {
        let parser = DescriptionParser::new("EUR");
        let items =
            parser.parse("1x Myth Realized (Dragons of Tarkir) - 26 - Rare - MT - English - Foil - 4,99 EUR");
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.quantity, Some(1));
        assert_eq!(item.product_name.as_deref(), Some("Myth Realized"));
        assert_eq!(item.set_name.as_deref(), Some("Dragons of Tarkir"));
        assert_eq!(item.quality, Quality::Mint);
        assert_eq!(item.language, Some(Language::English));
        assert!(item.foil);
        assert_eq!(item.unit_price, Some("4,99".parse().unwrap()));
        assert_eq!(item.total_price, Some("4,99".parse().unwrap()));
    }

    #[test]
    fn parse_fn_keeps_token_faces_in_the_product_name() {
        let parser = DescriptionParser::new("EUR");
        let items = parser.parse(
            "1x Beast Token (G 3/3) / Elemental Token (G 5/3) (Commander 2014) - T 19/21 - Token - MT - English - 0,10 EUR",
        );
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.quantity, Some(1));
        assert_eq!(
            item.product_name.as_deref(),
            Some("Beast Token (G 3/3) / Elemental Token (G 5/3)")
        );
        assert_eq!(item.set_name.as_deref(), Some("Commander 2014"));
        assert_eq!(item.quality, Quality::Mint);
        assert_eq!(item.language, Some(Language::English));
        assert!(!item.foil);
        assert_eq!(item.unit_price, Some("0,10".parse().unwrap()));
    }

    #[test]
    fn parse_fn_takes_the_outermost_trailing_group_as_the_set() {
        let parser = DescriptionParser::new("EUR");
        let items = parser
            .parse("1x Ajani Steadfast (Duel Decks: Anthology (DD3)) - M15 - Mythic - NM - German - 3,50 EUR");
        let item = &items[0];
        assert_eq!(item.set_name.as_deref(), Some("Duel Decks: Anthology (DD3)"));
        assert_eq!(item.product_name.as_deref(), Some("Ajani Steadfast"));
        assert_eq!(item.language, Some(Language::German));
    }

    #[test]
    fn parse_fn_strips_the_game_title_prefix_from_set_names() {
        let parser = DescriptionParser::new("EUR");
        let items = parser.parse("2x Plains (Magic: The Gathering | Theros) - 230 - NM - English - 0,05 EUR");
        assert_eq!(items[0].set_name.as_deref(), Some("Theros"));
    }

    #[test]
    fn parse_fn_defaults_quality_for_ungraded_products() {
        let parser = DescriptionParser::new("EUR");
        let items = parser.parse("3x 80 KMC Hyper mat Sleeves (Black) - English - 5,99 EUR");
        let item = &items[0];
        assert_eq!(item.quality, Quality::NotApplicable);
        assert_eq!(item.product_name.as_deref(), Some("80 KMC Hyper mat Sleeves"));
        assert_eq!(item.set_name.as_deref(), Some("Black"));
        assert_eq!(item.quantity, Some(3));
        assert_eq!(item.total_price, Some("17,97".parse().unwrap()));
        assert!(!item.foil);
    }

    #[test]
    fn parse_fn_never_drops_an_unreadable_segment() {
        let parser = DescriptionParser::new("EUR");
        let items = parser.parse("Mystery product with no structure at all");
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.quantity, None);
        assert_eq!(item.product_name, None);
        assert_eq!(item.set_name, None);
        assert_eq!(item.unit_price, None);
        assert_eq!(item.total_price, None);
        assert_eq!(item.quality, Quality::NotApplicable);
    }

    #[test]
    fn parse_fn_leaves_the_total_empty_unless_both_factors_are_known() {
        let parser = DescriptionParser::new("EUR");
        // Quantity but no price.
        let items = parser.parse("2x Strange Promo (Unknown Set) - NM - English");
        assert_eq!(items[0].quantity, Some(2));
        assert_eq!(items[0].unit_price, None);
        assert_eq!(items[0].total_price, None);
        // Price but no quantity.
        let items = parser.parse("Strange Promo (Unknown Set) - NM - English - 1,00 EUR");
        assert_eq!(items[0].quantity, None);
        assert_eq!(items[0].unit_price, Some("1,00".parse().unwrap()));
        assert_eq!(items[0].total_price, None);
    }

    #[test]
    fn parse_fn_only_matches_prices_in_the_report_currency() {
        let parser = DescriptionParser::new("GBP");
        let items = parser.parse("1x Myth Realized (Dragons of Tarkir) - MT - English - 4,99 EUR");
        assert_eq!(items[0].unit_price, None);
    }
}
