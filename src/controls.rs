//! Selector state for the viewer: which values can be picked, and how a
//! partially filled request resolves into concrete filter criteria.

use crate::data::TransactionTable;
use crate::processing::{AGE_LIMIT, AgeRange, FilterCriteria};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Deserializer, Serialize};

/// What the user has typed or picked so far. Missing fields take the
/// selector's default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SelectionRequest {
    pub municipality_search: Option<String>,
    pub municipality: Option<String>,
    pub price_category: Option<String>,
    pub period: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub age_min: Option<u32>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub age_max: Option<u32>,
}

// A cleared number input is submitted as `age_min=`; treat it as unset.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid building age: {:?}", value))),
    }
}

/// Values offered by each selector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Options {
    pub prefecture: String,
    /// Every prefecture in the table; the selector itself is pinned.
    pub prefectures: Vec<String>,
    pub municipalities: Vec<String>,
    pub price_categories: Vec<String>,
    pub periods: Vec<String>,
    pub age_limit: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Criteria(FilterCriteria),
    /// The municipality search left nothing to select.
    NoMunicipality,
}

pub fn options(table: &TransactionTable, prefecture: &str, municipality_search: &str) -> Options {
    Options {
        prefecture: prefecture.to_string(),
        prefectures: table.prefectures(),
        municipalities: search_municipalities(table, prefecture, municipality_search),
        price_categories: table.price_categories(),
        periods: table.periods(),
        age_limit: AGE_LIMIT,
    }
}

/// Municipalities of `prefecture` whose name contains `query`.
pub fn search_municipalities(
    table: &TransactionTable,
    prefecture: &str,
    query: &str,
) -> Vec<String> {
    table
        .municipalities(prefecture)
        .into_iter()
        .filter(|m| m.contains(query))
        .collect()
}

pub fn resolve(
    table: &TransactionTable,
    prefecture: &str,
    request: &SelectionRequest,
) -> Result<Selection> {
    let age = age_range(request.age_min, request.age_max)?;

    let search = request.municipality_search.as_deref().unwrap_or("");
    let candidates = search_municipalities(table, prefecture, search);
    let municipality = match pick(&request.municipality, &candidates) {
        Some(m) => m,
        None => return Ok(Selection::NoMunicipality),
    };

    // An unknown category simply filters to nothing.
    let first_category = table.price_categories().into_iter().next();
    let price_category = match (&request.price_category, first_category) {
        (Some(requested), _) if !requested.is_empty() => requested.clone(),
        (_, Some(first)) => first,
        (_, None) => String::new(),
    };

    let period = request.period.clone().filter(|p| !p.is_empty());

    Ok(Selection::Criteria(FilterCriteria {
        price_category,
        prefecture: prefecture.to_string(),
        municipality,
        age,
        period,
    }))
}

// Keep the requested municipality only while the search still offers it.
fn pick(requested: &Option<String>, candidates: &[String]) -> Option<String> {
    match requested {
        Some(m) if candidates.contains(m) => Some(m.clone()),
        _ => candidates.first().cloned(),
    }
}

fn age_range(min: Option<u32>, max: Option<u32>) -> Result<AgeRange> {
    let default = AgeRange::default();
    let range = AgeRange::new(min.unwrap_or(default.min), max.unwrap_or(default.max));
    if range.min > AGE_LIMIT || range.max > AGE_LIMIT {
        return Err(anyhow!(
            "Building age must be between 0 and {} (got {}..={})",
            AGE_LIMIT,
            range.min,
            range.max
        ));
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionRecord;

    fn row(category: &str, municipality: &str, period: &str) -> TransactionRecord {
        TransactionRecord {
            price_category: category.to_string(),
            prefecture: "福岡県".to_string(),
            municipality: municipality.to_string(),
            period: period.to_string(),
            district_name: "大名".to_string(),
            latitude: 33.59,
            longitude: 130.40,
            age: 10,
            unit_price: 150000.0,
        }
    }

    fn table() -> TransactionTable {
        TransactionTable::new(vec![
            row("成約価格情報", "福岡市中央区", "2023年第4四半期"),
            row("不動産取引価格情報", "福岡市博多区", "2023年第3四半期"),
            row("成約価格情報", "北九州市小倉北区", "2023年第3四半期"),
        ])
    }

    fn criteria(selection: Selection) -> FilterCriteria {
        match selection {
            Selection::Criteria(c) => c,
            Selection::NoMunicipality => panic!("expected criteria"),
        }
    }

    #[test]
    fn test_options_follow_the_table() {
        let opts = options(&table(), "福岡県", "");
        assert_eq!(opts.prefecture, "福岡県");
        assert_eq!(opts.prefectures, vec!["福岡県"]);
        assert_eq!(
            opts.municipalities,
            vec!["北九州市小倉北区", "福岡市中央区", "福岡市博多区"]
        );
        assert_eq!(opts.price_categories, vec!["成約価格情報", "不動産取引価格情報"]);
        assert_eq!(opts.periods, vec!["2023年第4四半期", "2023年第3四半期"]);
        assert_eq!(opts.age_limit, 99);
    }

    #[test]
    fn test_search_narrows_municipalities() {
        assert_eq!(
            search_municipalities(&table(), "福岡県", "福岡市"),
            vec!["福岡市中央区", "福岡市博多区"]
        );
        assert!(search_municipalities(&table(), "福岡県", "熊本").is_empty());
        assert!(search_municipalities(&table(), "佐賀県", "").is_empty());
    }

    #[test]
    fn test_defaults_pick_first_entries() {
        let c = criteria(resolve(&table(), "福岡県", &SelectionRequest::default()).unwrap());

        assert_eq!(c.prefecture, "福岡県");
        assert_eq!(c.municipality, "北九州市小倉北区");
        assert_eq!(c.price_category, "成約価格情報");
        assert_eq!(c.age, AgeRange::new(0, 99));
        assert_eq!(c.period, None);
    }

    #[test]
    fn test_explicit_selection_is_kept() {
        let request = SelectionRequest {
            municipality_search: Some("博多".to_string()),
            municipality: Some("福岡市博多区".to_string()),
            price_category: Some("不動産取引価格情報".to_string()),
            period: Some("2023年第3四半期".to_string()),
            age_min: Some(5),
            age_max: Some(30),
        };
        let c = criteria(resolve(&table(), "福岡県", &request).unwrap());

        assert_eq!(c.municipality, "福岡市博多区");
        assert_eq!(c.price_category, "不動産取引価格情報");
        assert_eq!(c.period.as_deref(), Some("2023年第3四半期"));
        assert_eq!(c.age, AgeRange::new(5, 30));
    }

    #[test]
    fn test_selection_outside_search_falls_back() {
        let request = SelectionRequest {
            municipality_search: Some("福岡市".to_string()),
            municipality: Some("北九州市小倉北区".to_string()),
            ..Default::default()
        };
        let c = criteria(resolve(&table(), "福岡県", &request).unwrap());
        assert_eq!(c.municipality, "福岡市中央区");
    }

    #[test]
    fn test_search_without_hits() {
        let request = SelectionRequest {
            municipality_search: Some("熊本".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve(&table(), "福岡県", &request).unwrap(), Selection::NoMunicipality);
    }

    #[test]
    fn test_empty_period_means_all_periods() {
        let request = SelectionRequest {
            period: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(criteria(resolve(&table(), "福岡県", &request).unwrap()).period, None);
    }

    #[test]
    fn test_blank_age_deserializes_as_unset() {
        let request: SelectionRequest =
            serde_json::from_str(r#"{"age_min": "", "age_max": " 30 "}"#).unwrap();
        assert_eq!(request.age_min, None);
        assert_eq!(request.age_max, Some(30));

        let c = criteria(resolve(&table(), "福岡県", &request).unwrap());
        assert_eq!(c.age, AgeRange::new(0, 30));
    }

    #[test]
    fn test_non_numeric_age_fails_to_deserialize() {
        assert!(serde_json::from_str::<SelectionRequest>(r#"{"age_min": "abc"}"#).is_err());
    }

    #[test]
    fn test_age_out_of_range_is_rejected() {
        let request = SelectionRequest {
            age_max: Some(100),
            ..Default::default()
        };
        assert!(resolve(&table(), "福岡県", &request).is_err());
    }

    #[test]
    fn test_inverted_age_range_is_passed_through() {
        let request = SelectionRequest {
            age_min: Some(40),
            age_max: Some(10),
            ..Default::default()
        };
        let c = criteria(resolve(&table(), "福岡県", &request).unwrap());
        assert_eq!(c.age, AgeRange::new(40, 10));
    }
}
