use crate::config::MapConfig;
use crate::controls::Options;
use crate::processing::FilterCriteria;
use crate::types::{AggregatePoint, PipelineOutcome};
use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::info;

pub const TITLE: &str = "成約坪単価Viewer";
pub const EMPTY_NOTICE: &str = "データがありません。絞り込み条件を変更してください。";
pub const DISCLAIMER: &str = "「このサービスは、国土交通省の不動産情報ライブラリのAPI機能を使用していますが、提供情報の最新性、正確性、完全性等が保証されたものではありません。」";
pub const PRICE_CATEGORY_HELP: &str = concat!(
    "「不動産取引価格情報」とは、土地・建物の取引を対象としたアンケート調査の結果得られた回答について、",
    "個別の物件を特定できないよう加工した、国土交通省が保有し提供する不動産取引価格情報をいいます。",
    "「成約価格情報」とは、指定流通機構（レインズ）保有の不動産取引価格情報を、",
    "国土交通省が個別の不動産取引が特定できないよう加工し、消費者向け不動産取引情報サービスである、",
    "「レインズ・マーケット・インフォメーション」（RMI）にて公表している情報をいいます。",
);
pub const AGE_HELP: &str = "集計対象とする最小および最大の築年数を選んでください";

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";
const TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
const TILE_ATTRIBUTION: &str = "&copy; OpenStreetMap contributors";

/// Everything one page render needs.
pub struct PageView<'a> {
    pub options: &'a Options,
    pub search: &'a str,
    /// `None` when no municipality could be selected.
    pub criteria: Option<&'a FilterCriteria>,
    pub outcome: &'a PipelineOutcome,
    pub map: &'a MapConfig,
    /// Include the filter form. Static exports have nothing to submit to.
    pub interactive: bool,
}

pub fn to_feature(point: &AggregatePoint) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("district".to_string(), JsonValue::from(point.district_name.clone()));
    properties.insert("label".to_string(), JsonValue::from(point.price_label.clone()));
    properties.insert("period".to_string(), JsonValue::from(point.period.clone()));
    properties.insert("municipality".to_string(), JsonValue::from(point.municipality.clone()));
    properties.insert("man_yen".to_string(), JsonValue::from(point.man_yen));
    properties.insert("transactions".to_string(), JsonValue::from(point.transactions));

    Feature {
        bbox: None,
        // GeoJSON positions are [lon, lat]
        geometry: Some(Geometry::new(Value::Point(vec![point.longitude, point.latitude]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn to_feature_collection(outcome: &PipelineOutcome) -> FeatureCollection {
    let features = match outcome {
        PipelineOutcome::Empty => Vec::new(),
        PipelineOutcome::Points { points, .. } => points.iter().map(to_feature).collect(),
    };
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn render_page(view: &PageView) -> Result<String> {
    let mut html = String::new();

    writeln!(html, "<!DOCTYPE html>")?;
    writeln!(html, "<html lang=\"ja\">\n<head>\n<meta charset=\"utf-8\">")?;
    writeln!(html, "<title>{}</title>", TITLE)?;
    writeln!(html, "<link rel=\"stylesheet\" href=\"{}\">", LEAFLET_CSS)?;
    writeln!(html, "<script src=\"{}\"></script>", LEAFLET_JS)?;
    writeln!(html, "</head>\n<body>")?;
    writeln!(html, "<h1>{}</h1>", TITLE)?;

    if view.interactive {
        write_form(&mut html, view)?;
    } else if let Some(criteria) = view.criteria {
        write_summary(&mut html, criteria)?;
    }

    match view.outcome {
        PipelineOutcome::Points { centroid, .. } if view.criteria.is_some() => {
            let data = serde_json::to_string(&to_feature_collection(view.outcome))
                .context("Failed to serialize map points")?
                .replace('<', "\\u003c");
            writeln!(
                html,
                "<div id=\"map\" style=\"width: {}px; height: {}px;\"></div>",
                view.map.width, view.map.height
            )?;
            writeln!(html, "<script>")?;
            writeln!(
                html,
                "const map = L.map('map').setView([{}, {}], {});",
                centroid.latitude, centroid.longitude, view.map.zoom_start
            )?;
            writeln!(
                html,
                "L.tileLayer('{}', {{ attribution: '{}' }}).addTo(map);",
                TILE_URL, TILE_ATTRIBUTION
            )?;
            writeln!(html, "const points = {};", data)?;
            // Leaflet parses string content as HTML; text nodes are inserted verbatim.
            writeln!(html, "const text = (value) => document.createTextNode(value);")?;
            writeln!(html, "L.geoJSON(points, {{")?;
            writeln!(html, "  pointToLayer: (feature, latlng) => L.marker(latlng)")?;
            writeln!(html, "    .bindTooltip(text(feature.properties.district))")?;
            writeln!(
                html,
                "    .bindPopup(text(feature.properties.label), {{ minWidth: 50, maxWidth: 100 }})"
            )?;
            writeln!(html, "}}).addTo(map);")?;
            writeln!(html, "</script>")?;
        }
        _ => {
            writeln!(html, "<p class=\"warning\">⚠️ {}</p>", EMPTY_NOTICE)?;
        }
    }

    writeln!(html, "<p class=\"info\">{}</p>", DISCLAIMER)?;
    writeln!(html, "</body>\n</html>")?;
    Ok(html)
}

fn write_form(html: &mut String, view: &PageView) -> Result<()> {
    let criteria = view.criteria;
    let selected_municipality = criteria.map(|c| c.municipality.as_str());
    let selected_category = criteria.map(|c| c.price_category.as_str());
    let selected_period = criteria.and_then(|c| c.period.as_deref()).unwrap_or("");
    let (age_min, age_max) =
        criteria.map_or((0, view.options.age_limit), |c| (c.age.min, c.age.max));

    writeln!(html, "<form method=\"get\" action=\"/\">")?;
    writeln!(html, "<h2>地域</h2>")?;
    writeln!(html, "<p>都道府県: {}</p>", escape_html(&view.options.prefecture))?;
    writeln!(
        html,
        "<label>検索ワード（市区町村） <input type=\"text\" name=\"municipality_search\" value=\"{}\"></label>",
        escape_html(view.search)
    )?;
    write_select(
        html,
        "市区町村",
        "municipality",
        view.options.municipalities.iter().map(|m| (m.as_str(), m.as_str())),
        selected_municipality.unwrap_or(""),
    )?;

    writeln!(html, "<h2 title=\"{}\">価格情報区分</h2>", escape_html(PRICE_CATEGORY_HELP))?;
    write_select(
        html,
        "価格情報区分",
        "price_category",
        view.options.price_categories.iter().map(|c| (c.as_str(), c.as_str())),
        selected_category.unwrap_or(""),
    )?;

    writeln!(html, "<h2>時期</h2>")?;
    write_select(
        html,
        "時期",
        "period",
        std::iter::once(("", "すべて"))
            .chain(view.options.periods.iter().map(|p| (p.as_str(), p.as_str()))),
        selected_period,
    )?;

    writeln!(html, "<h2 title=\"{}\">築年数</h2>", escape_html(AGE_HELP))?;
    for (name, value) in [("age_min", age_min), ("age_max", age_max)] {
        writeln!(
            html,
            "<input type=\"number\" name=\"{}\" min=\"0\" max=\"{}\" value=\"{}\">",
            name, view.options.age_limit, value
        )?;
    }

    writeln!(html, "<button type=\"submit\">表示</button>")?;
    writeln!(html, "</form>")?;
    Ok(())
}

fn write_select<'a>(
    html: &mut String,
    label: &str,
    name: &str,
    entries: impl Iterator<Item = (&'a str, &'a str)>,
    selected: &str,
) -> Result<()> {
    writeln!(html, "<label>{} <select name=\"{}\">", label, name)?;
    for (value, text) in entries {
        let marker = if value == selected { " selected" } else { "" };
        writeln!(
            html,
            "<option value=\"{}\"{}>{}</option>",
            escape_html(value),
            marker,
            escape_html(text)
        )?;
    }
    writeln!(html, "</select></label>")?;
    Ok(())
}

fn write_summary(html: &mut String, criteria: &FilterCriteria) -> Result<()> {
    writeln!(
        html,
        "<p>{} {} / {} / {} / 築{}〜{}年</p>",
        escape_html(&criteria.prefecture),
        escape_html(&criteria.municipality),
        escape_html(&criteria.price_category),
        escape_html(criteria.period.as_deref().unwrap_or("全期間")),
        criteria.age.min,
        criteria.age.max
    )?;
    Ok(())
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn write_page(path: &Path, view: &PageView) -> Result<()> {
    let html = render_page(view)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    fs::write(path, html).with_context(|| format!("Failed to write map page: {:?}", path))?;
    info!("Wrote map page to {:?}", path);
    Ok(())
}

pub fn write_geojson(path: &Path, outcome: &PipelineOutcome) -> Result<()> {
    let json = serde_json::to_string_pretty(&to_feature_collection(outcome))
        .context("Failed to serialize GeoJSON")?;
    fs::write(path, json).with_context(|| format!("Failed to write GeoJSON: {:?}", path))?;
    info!("Wrote GeoJSON to {:?}", path);
    Ok(())
}
