//! Keyword-to-metric mapping over the raw question text.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Metric {
    #[default]
    NetSale,
    GrossSale,
    SoldQty,
    TaxVat,
    Discount,
    ActualCost,
}

/// Keyword lists, tried in order; the first list with a hit decides.
const KEYWORDS: &[(Metric, &[&str])] = &[
    (
        Metric::SoldQty,
        &["qty", "quantity", "тоо", "ширхэг", "soldqty"],
    ),
    (Metric::GrossSale, &["gross", "grosssale", "нийт"]),
    (Metric::TaxVat, &["татвар", "vat", "tax"]),
    (Metric::Discount, &["хөнгөлөлт", "discount"]),
    (Metric::ActualCost, &["өртөг", "cost", "actualcost"]),
];

const ALL: [Metric; 6] = [
    Metric::NetSale,
    Metric::GrossSale,
    Metric::SoldQty,
    Metric::TaxVat,
    Metric::Discount,
    Metric::ActualCost,
];

impl Metric {
    /// Column name in the sales fact tables.
    pub fn column(self) -> &'static str {
        match self {
            Metric::NetSale => "NetSale",
            Metric::GrossSale => "GrossSale",
            Metric::SoldQty => "SoldQty",
            Metric::TaxVat => "Tax_VAT",
            Metric::Discount => "Discount",
            Metric::ActualCost => "ActualCost",
        }
    }

    /// Pick the metric a question asks about.
    ///
    /// A literal column name in the question (`NetSale`, `Tax_VAT`, ...) wins
    /// over keywords; otherwise the keyword lists are tried in order and
    /// `NetSale` is the fallback.
    pub fn from_question(question: &str) -> Metric {
        let q = question.to_lowercase();

        // Longest first so "grosssale" is not shadowed by a shorter name.
        let mut named: Vec<Metric> = ALL.to_vec();
        named.sort_by_key(|m| std::cmp::Reverse(m.column().len()));
        if let Some(m) = named
            .into_iter()
            .find(|m| q.contains(&m.column().to_lowercase()))
        {
            return m;
        }

        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| q.contains(w)))
            .map(|(m, _)| *m)
            .unwrap_or_default()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}
