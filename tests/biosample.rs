use assert_matches::assert_matches;

use taxon_gateway::biosample::{mine_oxygen_requirement, parse_sample, parse_sample_set};
use taxon_gateway::domain::{GramStain, OxygenRequirement};
use taxon_gateway::error::ApiError;

const TWO_SAMPLES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<BioSampleSet>
  <BioSample id="101" accession="SAMN101">
    <Description>
      <Title>Staphylococcus aureus strain X</Title>
      <Comment>
        <Paragraph>Clinical isolate.</Paragraph>
        <Paragraph>A Gram-positive coccus from a wound swab.</Paragraph>
      </Comment>
    </Description>
    <Attributes>
      <Attribute attribute_name="isolation source">wound swab</Attribute>
      <Attribute attribute_name="oxygen requirement">facultatively anaerobic</Attribute>
    </Attributes>
  </BioSample>
  <BioSample id="102" accession="SAMN102">
    <Attributes>
      <Attribute attribute_name="gram_stain" display_name="Gram Stain">negative</Attribute>
      <Attribute attribute_name="host">Homo sapiens</Attribute>
    </Attributes>
  </BioSample>
</BioSampleSet>"#;

#[test]
fn sample_order_and_attributes_preserved() {
    let records = parse_sample_set(TWO_SAMPLES).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].accession.as_deref(), Some("SAMN101"));
    assert_eq!(
        records[0].title.as_deref(),
        Some("Staphylococcus aureus strain X")
    );
    let names: Vec<&str> = records[0]
        .attributes
        .iter()
        .map(|attr| attr.name.as_str())
        .collect();
    assert_eq!(names, vec!["isolation source", "oxygen requirement"]);
    // display_name wins over attribute_name when both are present
    assert_eq!(records[1].attributes[0].name, "Gram Stain");
}

#[test]
fn gram_stain_mined_from_comment_first() {
    let records = parse_sample_set(TWO_SAMPLES).unwrap();
    assert_eq!(records[0].gram_stain_biosample, Some(GramStain::Positive));
}

#[test]
fn gram_stain_mined_from_named_attribute() {
    let records = parse_sample_set(TWO_SAMPLES).unwrap();
    assert_eq!(records[1].gram_stain_biosample, Some(GramStain::Negative));
}

#[test]
fn gram_stain_value_fallback_scan() {
    let fragment = r#"<BioSample id="7">
  <Attributes>
    <Attribute attribute_name="cell morphology">gram negative rod</Attribute>
  </Attributes>
</BioSample>"#;
    let record = parse_sample(fragment);
    assert_eq!(record.gram_stain_biosample, Some(GramStain::Negative));
}

#[test]
fn oxygen_mined_from_first_matching_attribute_name() {
    let records = parse_sample_set(TWO_SAMPLES).unwrap();
    assert_eq!(
        mine_oxygen_requirement(&records[0]),
        Some(OxygenRequirement::Facultative)
    );
    assert_eq!(mine_oxygen_requirement(&records[1]), None);
}

#[test]
fn parsing_is_deterministic() {
    let first = parse_sample_set(TWO_SAMPLES).unwrap();
    let second = parse_sample_set(TWO_SAMPLES).unwrap();
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.attributes, b.attributes);
        assert_eq!(a.gram_stain_biosample, b.gram_stain_biosample);
    }
}

#[test]
fn malformed_payload_is_an_error_for_sets() {
    assert_matches!(
        parse_sample_set("<BioSampleSet><BioSample"),
        Err(ApiError::XmlParse(_))
    );
}

#[test]
fn malformed_fragment_degrades_to_empty_record() {
    let record = parse_sample("<BioSample><unclosed");
    assert_eq!(record.id, None);
    assert!(record.attributes.is_empty());
    assert_eq!(record.gram_stain_biosample, None);
}
