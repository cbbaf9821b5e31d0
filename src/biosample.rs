use serde::Deserialize;

use crate::domain::{BioSampleRecord, GramStain, OxygenRequirement, SampleAttribute};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
struct BioSampleSetXml {
    #[serde(rename = "BioSample", default)]
    samples: Vec<BioSampleXml>,
}

#[derive(Debug, Deserialize)]
struct BioSampleXml {
    #[serde(rename = "@id", default)]
    id: Option<String>,
    #[serde(rename = "@accession", default)]
    accession: Option<String>,
    #[serde(rename = "Description", default)]
    description: Option<DescriptionXml>,
    #[serde(rename = "Attributes", default)]
    attributes: Option<AttributesXml>,
}

#[derive(Debug, Default, Deserialize)]
struct DescriptionXml {
    #[serde(rename = "Title", default)]
    title: Option<String>,
    #[serde(rename = "Comment", default)]
    comment: Option<CommentXml>,
}

#[derive(Debug, Default, Deserialize)]
struct CommentXml {
    #[serde(rename = "Paragraph", default)]
    paragraphs: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AttributesXml {
    #[serde(rename = "Attribute", default)]
    attributes: Vec<AttributeXml>,
}

#[derive(Debug, Deserialize)]
struct AttributeXml {
    #[serde(rename = "@attribute_name", default)]
    attribute_name: Option<String>,
    #[serde(rename = "@display_name", default)]
    display_name: Option<String>,
    #[serde(rename = "$text", default)]
    value: Option<String>,
}

/// Parses a combined biosample payload (one or more `<BioSample>` records,
/// with or without a `<BioSampleSet>` root). Record order matches the
/// upstream payload.
pub fn parse_sample_set(payload: &str) -> Result<Vec<BioSampleRecord>, ApiError> {
    let body = normalize_set(payload);
    let parsed: BioSampleSetXml =
        quick_xml::de::from_str(&body).map_err(|err| ApiError::XmlParse(err.to_string()))?;
    Ok(parsed.samples.into_iter().map(build_record).collect())
}

/// Parses a single biosample fragment. Malformed XML is reported and
/// degrades to an empty record rather than failing the caller.
pub fn parse_sample(fragment: &str) -> BioSampleRecord {
    match parse_sample_set(fragment) {
        Ok(mut records) if !records.is_empty() => records.remove(0),
        Ok(_) => BioSampleRecord::default(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to parse biosample fragment");
            BioSampleRecord::default()
        }
    }
}

/// First attribute whose name hints at oxygen metabolism decides the
/// requirement for the whole sample; its value is mapped onto the four
/// categories.
pub fn mine_oxygen_requirement(record: &BioSampleRecord) -> Option<OxygenRequirement> {
    let hit = record.attributes.iter().find(|attr| {
        let name = attr.name.to_lowercase();
        name.contains("oxygen") || name.contains("aerobic")
    })?;
    OxygenRequirement::from_text(&hit.value)
}

fn build_record(sample: BioSampleXml) -> BioSampleRecord {
    let mut gram: Option<GramStain> = None;
    let description = sample.description.unwrap_or_default();

    // Free-text description paragraphs carry the clearest signal; the first
    // confident match wins and is never overwritten.
    if let Some(comment) = &description.comment {
        for paragraph in &comment.paragraphs {
            if gram.is_none() {
                gram = GramStain::from_text(paragraph);
            }
        }
    }

    let mut attributes = Vec::new();
    for attr in sample
        .attributes
        .unwrap_or_default()
        .attributes
        .into_iter()
    {
        let value = attr.value.clone().unwrap_or_default();
        if gram.is_none() && attribute_names_mention_gram(&attr) {
            gram = GramStain::from_attribute_value(&value);
        }
        let name = attr
            .display_name
            .or(attr.attribute_name)
            .unwrap_or_default();
        attributes.push(SampleAttribute { name, value });
    }

    // Last resort: scan every captured value for the spelled-out phrases.
    if gram.is_none() {
        gram = attributes
            .iter()
            .find_map(|attr| GramStain::from_text(&attr.value));
    }

    BioSampleRecord {
        id: sample.id,
        accession: sample.accession,
        title: description.title,
        attributes,
        gram_stain_biosample: gram,
    }
}

fn attribute_names_mention_gram(attr: &AttributeXml) -> bool {
    let mentions = |name: &Option<String>| {
        name.as_deref()
            .map(|n| n.to_lowercase().contains("gram"))
            .unwrap_or(false)
    };
    mentions(&attr.attribute_name) || mentions(&attr.display_name)
}

fn normalize_set(payload: &str) -> String {
    let mut body = payload.trim();
    if let Some(rest) = body.strip_prefix("<?xml") {
        if let Some(end) = rest.find("?>") {
            body = rest[end + 2..].trim_start();
        }
    }
    if let Some(rest) = body.strip_prefix("<!DOCTYPE") {
        if let Some(end) = rest.find('>') {
            body = rest[end + 1..].trim_start();
        }
    }
    if body.starts_with("<BioSampleSet") {
        body.to_string()
    } else {
        format!("<BioSampleSet>{body}</BioSampleSet>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_bare_fragments() {
        let wrapped = normalize_set("<BioSample id=\"1\"/>");
        assert!(wrapped.starts_with("<BioSampleSet>"));
        let untouched = normalize_set("<BioSampleSet><BioSample id=\"1\"/></BioSampleSet>");
        assert!(untouched.starts_with("<BioSampleSet>"));
        assert!(!untouched.starts_with("<BioSampleSet><BioSampleSet"));
    }

    #[test]
    fn strips_xml_declaration() {
        let wrapped = normalize_set("<?xml version=\"1.0\"?>\n<BioSample id=\"1\"/>");
        assert!(wrapped.starts_with("<BioSampleSet>"));
    }
}
