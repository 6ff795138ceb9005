//! Layer metadata.
//!
//! Each layer directory carries a `layer.properties` file in the Java
//! properties format: `key=value`, `key: value` or `key value` pairs,
//! `#`/`!` comments, backslash escapes and line continuations.

use crate::raster::DataType;
use crate::Result;
use std::collections::BTreeMap;
use std::io::Read;

/// Property naming the layer's type. Required.
pub const LAYER_TYPE_KEY: &str = "LayerType";

const NUMBER_OF_LEVELS_KEY: &str = "NumberOfLevels";
const TILE_WIDTH_KEY: &str = "TileWidth";
const TILE_LENGTH_KEY: &str = "TileLength";
const DATA_TYPE_KEY: &str = "DataType";

/// Key/value metadata of one layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerProperties {
    values: BTreeMap<String, String>,
}

impl LayerProperties {
    /// Read a properties file. Bytes are decoded as ISO-8859-1.
    pub fn read<R: Read>(input: R) -> Result<Self> {
        let values = java_properties::read(input)?;
        Ok(Self {
            values: values.into_iter().collect(),
        })
    }

    /// Parse properties text; non-ASCII characters should be `\uXXXX` escaped.
    pub fn parse(text: &str) -> Result<Self> {
        Self::read(text.as_bytes())
    }

    /// Raw value of a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Set a key, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// The layer's declared type, if present and non-empty.
    pub fn layer_type(&self) -> Option<&str> {
        self.get(LAYER_TYPE_KEY).filter(|value| !value.is_empty())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over all pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key)?.trim().parse().ok()
    }
}

/// A discovered layer: its directory name and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    pub name: String,
    pub layer_type: String,
    pub properties: LayerProperties,
}

impl LayerDescriptor {
    /// Build a descriptor from parsed properties; `None` without a `LayerType`.
    pub fn from_properties(name: &str, properties: LayerProperties) -> Option<Self> {
        let layer_type = properties.layer_type()?.to_string();
        Some(Self {
            name: name.to_string(),
            layer_type,
            properties,
        })
    }

    /// Whether this layer defines tile existence for the landscape.
    pub fn is_elevation(&self) -> bool {
        self.layer_type == "elevation"
    }

    pub fn number_of_levels(&self) -> Option<u32> {
        self.properties.get_parsed(NUMBER_OF_LEVELS_KEY)
    }

    pub fn tile_width(&self) -> Option<u32> {
        self.properties.get_parsed(TILE_WIDTH_KEY)
    }

    pub fn tile_length(&self) -> Option<u32> {
        self.properties.get_parsed(TILE_LENGTH_KEY)
    }

    /// Declared sample type of the layer's tiles.
    pub fn data_type(&self) -> Option<DataType> {
        self.properties.get_parsed(DATA_TYPE_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ELEVATION_PROPERTIES: &str = "\
# Layer properties
LayerType=elevation
NumberOfLevels = 5
TileWidth: 128
TileLength 128
DataType=Float
! another comment

Description=Gale crater \\
    mosaic
";

    #[test]
    fn test_parse_separators() {
        let props = LayerProperties::parse(ELEVATION_PROPERTIES).unwrap();
        assert_eq!(props.get("LayerType"), Some("elevation"));
        assert_eq!(props.get("NumberOfLevels"), Some("5"));
        assert_eq!(props.get("TileWidth"), Some("128"));
        assert_eq!(props.get("TileLength"), Some("128"));
        assert_eq!(props.get("Description"), Some("Gale crater mosaic"));
        assert_eq!(props.len(), 6);
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let props = LayerProperties::parse("# a=b\n! c=d\n\n   \n").unwrap();
        assert!(props.is_empty());
    }

    #[test]
    fn test_key_without_value() {
        let props = LayerProperties::parse("Flag\nEmpty=\n").unwrap();
        assert_eq!(props.get("Flag"), Some(""));
        assert_eq!(props.get("Empty"), Some(""));
    }

    #[test]
    fn test_later_keys_win() {
        let props = LayerProperties::parse("LayerType=texture\nLayerType=elevation\n").unwrap();
        assert_eq!(props.layer_type(), Some("elevation"));
    }

    #[test]
    fn test_escaped_backslash_ends_value() {
        let props = LayerProperties::parse("Source=C:\\\\data\\\\\nLayerType=elevation\n").unwrap();
        assert_eq!(props.get("Source"), Some("C:\\data\\"));
        assert_eq!(props.layer_type(), Some("elevation"));
    }

    #[test]
    fn test_escapes_in_keys_and_values() {
        let props = LayerProperties::parse("Site\\ Name=Gale\\tcrater\nUnicode=\\u00e9\n").unwrap();
        assert_eq!(props.get("Site Name"), Some("Gale\tcrater"));
        assert_eq!(props.get("Unicode"), Some("\u{e9}"));
    }

    #[test]
    fn test_read_latin1_bytes() {
        let props = LayerProperties::read(&b"LayerType=elevation\nSite=Jezero \xe9\n"[..]).unwrap();
        assert_eq!(props.get("Site"), Some("Jezero \u{e9}"));
        assert_eq!(props.layer_type(), Some("elevation"));
    }

    #[test]
    fn test_descriptor_accessors() {
        let props = LayerProperties::parse(ELEVATION_PROPERTIES).unwrap();
        let layer = LayerDescriptor::from_properties("gale", props).unwrap();
        assert_eq!(layer.name, "gale");
        assert!(layer.is_elevation());
        assert_eq!(layer.number_of_levels(), Some(5));
        assert_eq!(layer.tile_width(), Some(128));
        assert_eq!(layer.tile_length(), Some(128));
        assert_eq!(layer.data_type(), Some(DataType::Float));
    }

    #[test]
    fn test_descriptor_requires_layer_type() {
        assert!(LayerDescriptor::from_properties("x", LayerProperties::parse("TileWidth=4\n").unwrap()).is_none());
        assert!(LayerDescriptor::from_properties("x", LayerProperties::parse("LayerType=\n").unwrap()).is_none());
    }

    #[test]
    fn test_non_elevation_layer() {
        let props = LayerProperties::parse("LayerType=texture\nDataType=bogus").unwrap();
        let layer = LayerDescriptor::from_properties("rgb", props).unwrap();
        assert!(!layer.is_elevation());
        assert_eq!(layer.data_type(), None);
        assert_eq!(layer.number_of_levels(), None);
    }
}
