//! Generic attribute tree.
//!
//! The converter never looks at raw XML. Input arrives as an [`AttrNode`]
//! tree (scalar | sequence | mapping) and every read goes through the typed
//! accessors below, which fail with [`ConvertError::SchemaViolation`] or
//! [`ConvertError::InvalidValue`] instead of panicking on a missing key.
//!
//! Mappings keep declaration order so that iteration over bodies, joints and
//! coordinates is deterministic.
//!
//! XML documents can be loaded with [`parse_xml_str`]: elements become
//! mappings, attributes become `@name` keys, text-only elements become
//! scalars and repeated child tags collapse into a sequence. Whether a child
//! is "one record or a list of records" is therefore only known at read time,
//! and [`AttrNode::items`] is the single place that normalises it.

use std::collections::HashMap;

use nalgebra::Vector3;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{ConvertError, Result};

/// One node of a parsed attribute tree.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrNode {
    /// Leaf value, kept as text until a typed accessor interprets it.
    Scalar(String),
    /// Ordered list of nodes.
    Sequence(Vec<AttrNode>),
    /// Ordered key/value record.
    Mapping(Vec<(String, AttrNode)>),
}

impl From<&str> for AttrNode {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for AttrNode {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<AttrNode>> for AttrNode {
    fn from(value: Vec<AttrNode>) -> Self {
        Self::Sequence(value)
    }
}

impl AttrNode {
    /// Create an empty mapping.
    #[must_use]
    pub fn map() -> Self {
        Self::Mapping(Vec::new())
    }

    /// Append a key to a mapping (builder style).
    ///
    /// Has no effect on scalars and sequences.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrNode>) -> Self {
        if let Self::Mapping(entries) = &mut self {
            entries.push((key.into(), value.into()));
        }
        self
    }

    /// Look up the first entry with `key` in a mapping.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttrNode> {
        match self {
            Self::Mapping(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Look up a required key.
    pub fn require(&self, key: &str, context: &str) -> Result<&AttrNode> {
        self.get(key).ok_or_else(|| ConvertError::schema(key, context))
    }

    /// Returns `true` if the mapping contains `key`.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Mapping entries in declaration order (empty for non-mappings).
    #[must_use]
    pub fn entries(&self) -> &[(String, AttrNode)] {
        match self {
            Self::Mapping(entries) => entries,
            _ => &[],
        }
    }

    /// Scalar text, if this node is a scalar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Normalise "one record or a list of records" into a list.
    ///
    /// Sequences yield their elements, any other node yields itself.
    #[must_use]
    pub fn items(&self) -> Vec<&AttrNode> {
        match self {
            Self::Sequence(nodes) => nodes.iter().collect(),
            other => vec![other],
        }
    }

    /// [`items`](Self::items) of the child `key`, or nothing if it is absent.
    #[must_use]
    pub fn items_of(&self, key: &str) -> Vec<&AttrNode> {
        self.get(key).map(AttrNode::items).unwrap_or_default()
    }

    /// The `@name` attribute, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.opt_str("@name")
    }

    /// Optional scalar child.
    #[must_use]
    pub fn opt_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AttrNode::as_str).map(str::trim)
    }

    /// Required scalar child.
    pub fn str(&self, key: &str, context: &str) -> Result<&str> {
        self.require(key, context)?
            .as_str()
            .map(str::trim)
            .ok_or_else(|| ConvertError::schema(key, context))
    }

    /// Required floating point child.
    pub fn f64(&self, key: &str, context: &str) -> Result<f64> {
        parse_f64(self.str(key, context)?, key, context)
    }

    /// Optional floating point child.
    pub fn opt_f64(&self, key: &str, context: &str) -> Result<Option<f64>> {
        self.opt_str(key)
            .map(|s| parse_f64(s, key, context))
            .transpose()
    }

    /// Required whitespace-separated list of floats.
    pub fn floats(&self, key: &str, context: &str) -> Result<Vec<f64>> {
        parse_floats(self.str(key, context)?, key, context)
    }

    /// Required 3-vector.
    pub fn vec3(&self, key: &str, context: &str) -> Result<Vector3<f64>> {
        parse_vector3(self.str(key, context)?, key, context)
    }

    /// Optional 3-vector.
    pub fn opt_vec3(&self, key: &str, context: &str) -> Result<Option<Vector3<f64>>> {
        self.opt_str(key)
            .map(|s| parse_vector3(s, key, context))
            .transpose()
    }

    /// Boolean child (`true`/`false`, case-insensitive), with a default when absent.
    pub fn flag(&self, key: &str, context: &str, default: bool) -> Result<bool> {
        match self.opt_str(key) {
            None => Ok(default),
            Some(s) if s.eq_ignore_ascii_case("true") => Ok(true),
            Some(s) if s.eq_ignore_ascii_case("false") => Ok(false),
            Some(s) => Err(ConvertError::invalid_value(
                key,
                context,
                format!("expected 'true' or 'false', got '{s}'"),
            )),
        }
    }
}

fn parse_f64(s: &str, key: &str, context: &str) -> Result<f64> {
    let value = s
        .trim()
        .parse::<f64>()
        .map_err(|e| ConvertError::invalid_value(key, context, format!("'{s}': {e}")))?;
    if !value.is_finite() {
        return Err(ConvertError::invalid_value(
            key,
            context,
            format!("'{s}' is not a finite number"),
        ));
    }
    Ok(value)
}

fn parse_floats(s: &str, key: &str, context: &str) -> Result<Vec<f64>> {
    s.split_whitespace()
        .map(|part| parse_f64(part, key, context))
        .collect()
}

fn parse_vector3(s: &str, key: &str, context: &str) -> Result<Vector3<f64>> {
    let values = parse_floats(s, key, context)?;
    if values.len() != 3 {
        return Err(ConvertError::invalid_value(
            key,
            context,
            format!("expected 3 values, got {}", values.len()),
        ));
    }
    Ok(Vector3::new(values[0], values[1], values[2]))
}

// ============================================================================
// XML reader
// ============================================================================

/// Element under construction.
struct OpenElement {
    tag: String,
    children: Vec<(String, AttrNode)>,
    text: String,
}

impl OpenElement {
    fn new(start: &BytesStart) -> Result<Self> {
        Ok(Self {
            tag: element_name(start),
            children: attributes(start)?,
            text: String::new(),
        })
    }

    fn finish(self) -> AttrNode {
        let text = self.text.trim().to_string();
        if self.children.is_empty() {
            return if text.is_empty() {
                AttrNode::map()
            } else {
                AttrNode::Scalar(text)
            };
        }

        // Collapse repeated tags into sequences, keeping first-appearance order
        let mut order: Vec<(String, Vec<AttrNode>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for (key, node) in self.children {
            if let Some(&i) = index.get(&key) {
                order[i].1.push(node);
            } else {
                index.insert(key.clone(), order.len());
                order.push((key, vec![node]));
            }
        }

        let mut entries: Vec<(String, AttrNode)> = order
            .into_iter()
            .map(|(key, mut nodes)| {
                let node = if nodes.len() == 1 {
                    nodes.remove(0)
                } else {
                    AttrNode::Sequence(nodes)
                };
                (key, node)
            })
            .collect();
        if !text.is_empty() {
            entries.push(("#text".to_string(), AttrNode::Scalar(text)));
        }
        AttrNode::Mapping(entries)
    }
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart) -> Result<Vec<(String, AttrNode)>> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ConvertError::XmlParse(err.to_string()))?;
        let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
        let value = attr
            .unescape_value()
            .map_err(|err| ConvertError::XmlParse(err.to_string()))?;
        attrs.push((key, AttrNode::Scalar(value.into_owned())));
    }
    Ok(attrs)
}

/// Parse an XML document into an attribute tree.
///
/// The returned node is a mapping with a single entry keyed by the root tag.
///
/// # Errors
///
/// Returns [`ConvertError::XmlParse`] if the document is malformed.
pub fn parse_xml_str(xml: &str) -> Result<AttrNode> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<OpenElement> = Vec::new();
    let mut root: Option<(String, AttrNode)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => stack.push(OpenElement::new(e)?),
            Ok(Event::Empty(ref e)) => {
                let element = OpenElement::new(e)?;
                let tag = element.tag.clone();
                attach(&mut stack, &mut root, tag, element.finish());
            }
            Ok(Event::Text(ref e)) => {
                if let Some(top) = stack.last_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| ConvertError::XmlParse(err.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ConvertError::XmlParse("unbalanced end tag".into()))?;
                let tag = element.tag.clone();
                attach(&mut stack, &mut root, tag, element.finish());
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ConvertError::XmlParse(e.to_string())),
        }
    }

    if !stack.is_empty() {
        return Err(ConvertError::XmlParse("unexpected EOF inside element".into()));
    }
    root.map(|(tag, node)| AttrNode::Mapping(vec![(tag, node)]))
        .ok_or_else(|| ConvertError::XmlParse("document has no root element".into()))
}

fn attach(
    stack: &mut [OpenElement],
    root: &mut Option<(String, AttrNode)>,
    tag: String,
    node: AttrNode,
) {
    match stack.last_mut() {
        Some(parent) => parent.children.push((tag, node)),
        None => *root = Some((tag, node)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_items_normalises_single_and_list() {
        let single = AttrNode::map().with("Body", AttrNode::map().with("@name", "a"));
        assert_eq!(single.items_of("Body").len(), 1);

        let list = AttrNode::map().with(
            "Body",
            vec![
                AttrNode::map().with("@name", "a"),
                AttrNode::map().with("@name", "b"),
            ],
        );
        let items = list.items_of("Body");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].name(), Some("b"));

        assert!(list.items_of("Joint").is_empty());
    }

    #[test]
    fn test_missing_key_is_schema_violation() {
        let node = AttrNode::map().with("@name", "pelvis");
        let err = node.f64("mass", "body 'pelvis'").unwrap_err();
        assert!(matches!(err, ConvertError::SchemaViolation { ref key, .. } if key == "mass"));
    }

    #[test]
    fn test_bad_number_is_invalid_value() {
        let node = AttrNode::map().with("mass", "heavy");
        let err = node.f64("mass", "body").unwrap_err();
        assert!(matches!(err, ConvertError::InvalidValue { .. }));
    }

    #[test]
    fn test_non_finite_numbers_are_rejected() {
        for text in ["NaN", "inf", "-inf", "infinity"] {
            let node = AttrNode::map().with("mass", text);
            let err = node.f64("mass", "body").unwrap_err();
            assert!(matches!(err, ConvertError::InvalidValue { ref key, .. } if key == "mass"));
        }

        let table = AttrNode::map().with("x", "0 1 inf 3");
        assert!(table.floats("x", "SimmSpline").is_err());
    }

    #[test]
    fn test_vec3_and_flag() {
        let node = AttrNode::map()
            .with("translation", "  0.1 -0.2   0.3 ")
            .with("locked", "TRUE");
        let v = node.vec3("translation", "frame").unwrap();
        assert_relative_eq!(v.y, -0.2, epsilon = 1e-12);
        assert!(node.flag("locked", "coordinate", false).unwrap());
        assert!(!node.flag("clamped", "coordinate", false).unwrap());

        let short = AttrNode::map().with("translation", "1 2");
        assert!(short.vec3("translation", "frame").is_err());
    }

    #[test]
    fn test_parse_xml_collapses_repeated_tags() {
        let xml = r#"<?xml version="1.0"?>
            <Model name="arm">
                <BodySet>
                    <objects>
                        <Body name="humerus"><mass>2.0</mass></Body>
                        <Body name="ulna"><mass>1.0</mass></Body>
                    </objects>
                </BodySet>
                <credits>none</credits>
            </Model>
        "#;
        let doc = parse_xml_str(xml).unwrap();
        let model = doc.get("Model").unwrap();
        assert_eq!(model.name(), Some("arm"));
        assert_eq!(model.opt_str("credits"), Some("none"));

        let bodies = model
            .get("BodySet")
            .and_then(|b| b.get("objects"))
            .unwrap()
            .items_of("Body");
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0].name(), Some("humerus"));
        assert_relative_eq!(bodies[1].f64("mass", "body").unwrap(), 1.0);
    }

    #[test]
    fn test_parse_xml_empty_element() {
        let doc = parse_xml_str(r#"<Model name="m"><objects/></Model>"#).unwrap();
        let model = doc.get("Model").unwrap();
        assert!(model.get("objects").unwrap().entries().is_empty());
    }

    #[test]
    fn test_parse_xml_rejects_malformed() {
        assert!(parse_xml_str("<Model><Body></Model>").is_err());
        assert!(parse_xml_str("").is_err());
    }
}
