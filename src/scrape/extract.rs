use crate::scrape::document::Document;
use crate::scrape::types::{present, MetadataRecord, OpenGraph, TwitterCard};

const TITLE_SELECTORS: &[&str] = &["head title", "title"];

type OgSetter = fn(&mut OpenGraph, String);
type TwitterSetter = fn(&mut TwitterCard, String);

/// `og:<name>` properties, read from `meta[property=...]`.
const OG_FIELDS: &[(&str, OgSetter)] = &[
    ("title", |og, v| og.title = Some(v)),
    ("description", |og, v| og.description = Some(v)),
    ("image", |og, v| og.image = Some(v)),
    ("image:alt", |og, v| og.image_alt = Some(v)),
    ("image:width", |og, v| og.image_width = Some(v)),
    ("image:height", |og, v| og.image_height = Some(v)),
    ("url", |og, v| og.url = Some(v)),
    ("type", |og, v| og.kind = Some(v)),
    ("site_name", |og, v| og.site_name = Some(v)),
];

/// `twitter:<name>` cards, read from `meta[name=...]`.
const TWITTER_FIELDS: &[(&str, TwitterSetter)] = &[
    ("title", |tw, v| tw.title = Some(v)),
    ("description", |tw, v| tw.description = Some(v)),
    ("image", |tw, v| tw.image = Some(v)),
    ("site", |tw, v| tw.site = Some(v)),
    ("card", |tw, v| tw.card = Some(v)),
];

fn meta_name(doc: &Document, name: &str) -> Option<String> {
    doc.attr(&[format!(r#"meta[name="{name}"]"#).as_str()], "content")
}

fn meta_property(doc: &Document, property: &str) -> Option<String> {
    doc.attr(&[format!(r#"meta[property="{property}"]"#).as_str()], "content")
}

/// Everything that can be read straight off the document. `favicon` and
/// `oembed` need network access and are left empty.
pub fn extract(doc: &Document) -> MetadataRecord {
    let mut og = OpenGraph::default();
    for (name, set) in OG_FIELDS {
        if let Some(value) = meta_property(doc, &format!("og:{name}")) {
            set(&mut og, value);
        }
    }

    let mut twitter = TwitterCard::default();
    for (name, set) in TWITTER_FIELDS {
        if let Some(value) = meta_name(doc, &format!("twitter:{name}")) {
            set(&mut twitter, value);
        }
    }

    MetadataRecord {
        title: doc.text(TITLE_SELECTORS),
        description: meta_name(doc, "description"),
        theme_color: meta_name(doc, "theme-color"),
        og: present(og, OpenGraph::is_empty),
        twitter: present(twitter, TwitterCard::is_empty),
        ..Default::default()
    }
}
