use crate::core::height::HeightInference;
use crate::domain::model::{BoundaryRing, Device, GeoBoundingBox, ParsedDocument, Transmitter};
use crate::utils::error::{CoverageError, Result};
use roxmltree::{Document, Node, ParsingOptions};
use serde::{Deserialize, Serialize};

/// 兩代 KML 命名空間都要能解析；沒有命名空間的手寫文件也接受
pub const KML_NAMESPACES: &[&str] = &[
    "http://www.opengis.net/kml/2.2",
    "http://earth.google.com/kml/2.2",
    "http://earth.google.com/kml/2.1",
    "http://earth.google.com/kml/2.0",
];

const HEIGHT_DATA_KEYS: &[&str] = &["height", "height_m", "altura"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacemarkClass {
    Transmitter,
    BoundaryRing,
    Device,
}

/// 以名稱子字串（不分大小寫）分類地標
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacemarkVocabulary {
    pub transmitter: Vec<String>,
    pub device: Vec<String>,
    pub boundary_ring: Vec<String>,
}

impl Default for PlacemarkVocabulary {
    fn default() -> Self {
        let owned = |words: &[&str]| -> Vec<String> {
            words.iter().map(|w| w.to_string()).collect()
        };
        Self {
            transmitter: owned(&[
                "antenna",
                "antena",
                "repeater",
                "repetidora",
                "tower",
                "torre",
                "barn",
                "barracão",
                "shed",
                "galpão",
                "silo",
            ]),
            device: owned(&["pivot", "pivô", "pivo"]),
            boundary_ring: owned(&[
                "circle measurement",
                "medição do círculo",
                "medição de círculo",
            ]),
        }
    }
}

impl PlacemarkVocabulary {
    /// 先比對發射端，再比對圓環，最後才是設備；命中即停止
    pub fn classify(&self, name: &str) -> Option<PlacemarkClass> {
        let lowered = name.to_lowercase();
        let hit = |words: &[String]| {
            words
                .iter()
                .any(|w| !w.is_empty() && lowered.contains(&w.to_lowercase()))
        };

        if hit(&self.transmitter) {
            Some(PlacemarkClass::Transmitter)
        } else if hit(&self.boundary_ring) {
            Some(PlacemarkClass::BoundaryRing)
        } else if hit(&self.device) {
            Some(PlacemarkClass::Device)
        } else {
            None
        }
    }
}

/// KML 向量文件解析器
#[derive(Debug, Clone, Default)]
pub struct KmlParser {
    vocabulary: PlacemarkVocabulary,
    heights: HeightInference,
}

impl KmlParser {
    pub fn new(vocabulary: PlacemarkVocabulary, heights: HeightInference) -> Self {
        Self {
            vocabulary,
            heights,
        }
    }

    /// 解析出唯一的發射端、依序的設備與量測圓環。
    ///
    /// 多個發射端時以最後一個為準。找不到發射端或 XML 不合法時回傳 `ParseError`。
    pub fn parse(&self, content: &str) -> Result<ParsedDocument> {
        let doc = parse_xml(content)?;

        let mut transmitter: Option<Transmitter> = None;
        let mut devices = Vec::new();
        let mut boundary_rings = Vec::new();

        for placemark in doc.descendants().filter(|n| is_kml(n, "Placemark")) {
            let name = child_text(placemark, "name").unwrap_or_default();
            let Some(class) = self.vocabulary.classify(&name) else {
                tracing::trace!("Ignoring unclassified placemark '{}'", name);
                continue;
            };

            match class {
                PlacemarkClass::Transmitter => {
                    let Some((latitude, longitude)) = point_of(placemark) else {
                        tracing::warn!("⚠️ Transmitter placemark '{}' has no usable point", name);
                        continue;
                    };
                    let height_m = structured_height(placemark)
                        .unwrap_or_else(|| self.heights.infer(&name));

                    if let Some(previous) = &transmitter {
                        tracing::warn!(
                            "⚠️ Multiple transmitters found, '{}' replaces '{}'",
                            name,
                            previous.name
                        );
                    }
                    transmitter = Some(Transmitter {
                        name,
                        latitude,
                        longitude,
                        height_m,
                    });
                }
                PlacemarkClass::Device => match point_of(placemark) {
                    Some((latitude, longitude)) => devices.push(Device {
                        name,
                        latitude,
                        longitude,
                    }),
                    None => tracing::warn!("⚠️ Device placemark '{}' has no usable point", name),
                },
                PlacemarkClass::BoundaryRing => {
                    let points = line_of(placemark);
                    if points.is_empty() {
                        tracing::warn!("⚠️ Ring placemark '{}' has no usable coordinates", name);
                        continue;
                    }
                    boundary_rings.push(BoundaryRing { name, points });
                }
            }
        }

        let transmitter = transmitter.ok_or_else(|| {
            CoverageError::parse("no transmitter placemark (antenna, repeater, tower, ...) found")
        })?;

        tracing::debug!(
            "Parsed transmitter '{}' with {} devices and {} rings",
            transmitter.name,
            devices.len(),
            boundary_rings.len()
        );

        Ok(ParsedDocument {
            transmitter,
            devices,
            boundary_rings,
        })
    }
}

/// 讀取 `GroundOverlay/LatLonBox`（傳播服務附帶的邊界描述）
pub fn parse_lat_lon_box(content: &str) -> Result<GeoBoundingBox> {
    let doc = parse_xml(content)?;
    let node = doc
        .descendants()
        .find(|n| is_kml(n, "LatLonBox"))
        .ok_or_else(|| CoverageError::parse("document has no LatLonBox element"))?;

    let edge = |tag: &str| -> Result<f64> {
        child_text(node, tag)
            .and_then(|t| t.trim().parse::<f64>().ok())
            .ok_or_else(|| CoverageError::parse(format!("LatLonBox is missing a numeric <{}>", tag)))
    };

    Ok(GeoBoundingBox::new(
        edge("north")?,
        edge("south")?,
        edge("east")?,
        edge("west")?,
    ))
}

fn parse_xml(content: &str) -> Result<Document<'_>> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(content.trim_start_matches('\u{feff}'), options)
        .map_err(|e| CoverageError::parse(format!("malformed KML markup: {}", e)))
}

fn is_kml(node: &Node, local_name: &str) -> bool {
    if !node.is_element() || node.tag_name().name() != local_name {
        return false;
    }
    match node.tag_name().namespace() {
        None => true,
        Some(ns) => KML_NAMESPACES.contains(&ns),
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, local_name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| is_kml(n, local_name))
}

fn child_text(node: Node, local_name: &str) -> Option<String> {
    child(node, local_name)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
}

/// 第一個 `Point/coordinates`
fn point_of(placemark: Node) -> Option<(f64, f64)> {
    placemark
        .descendants()
        .filter(|n| is_kml(n, "Point"))
        .filter_map(|p| child(p, "coordinates").and_then(|c| c.text()))
        .find_map(|text| text.split_whitespace().next().and_then(parse_tuple))
}

/// 第一個 `LineString` 或 `LinearRing` 的座標序列
fn line_of(placemark: Node) -> Vec<(f64, f64)> {
    placemark
        .descendants()
        .filter(|n| is_kml(n, "LineString") || is_kml(n, "LinearRing"))
        .find_map(|line| child(line, "coordinates").and_then(|c| c.text()))
        .map(parse_coordinate_list)
        .unwrap_or_default()
}

/// 以空白分隔的 `lon,lat[,alt]` 序列；無法解析的項目直接略過
pub fn parse_coordinate_list(text: &str) -> Vec<(f64, f64)> {
    text.split_whitespace()
        .filter_map(|tuple| {
            let parsed = parse_tuple(tuple);
            if parsed.is_none() {
                tracing::debug!("Skipping malformed coordinate tuple '{}'", tuple);
            }
            parsed
        })
        .collect()
}

/// KML 座標順序固定為經度在前、緯度在後；回傳 (latitude, longitude)
pub fn parse_tuple(tuple: &str) -> Option<(f64, f64)> {
    let mut fields = tuple.split(',');
    let longitude = fields.next()?.trim().parse::<f64>().ok()?;
    let latitude = fields.next()?.trim().parse::<f64>().ok()?;
    (longitude.is_finite() && latitude.is_finite()).then_some((latitude, longitude))
}

fn structured_height(placemark: Node) -> Option<f64> {
    let extended = child(placemark, "ExtendedData")?;
    extended
        .descendants()
        .filter(|n| is_kml(n, "Data") || is_kml(n, "SimpleData"))
        .filter(|n| {
            n.attribute("name")
                .map(|key| HEIGHT_DATA_KEYS.contains(&key.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .filter_map(|n| {
            let raw = if is_kml(&n, "Data") {
                child(n, "value").and_then(|v| v.text())
            } else {
                n.text()
            };
            raw?.trim().replace(',', ".").parse::<f64>().ok()
        })
        .find(|h| *h > 0.0 && h.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kml(namespace: &str, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="{}"><Document>{}</Document></kml>"#,
            namespace, body
        )
    }

    fn point(name: &str, coords: &str) -> String {
        format!(
            "<Placemark><name>{}</name><Point><coordinates>{}</coordinates></Point></Placemark>",
            name, coords
        )
    }

    #[test]
    fn test_parse_tower_and_pivot_scenario() {
        let content = kml(
            KML_NAMESPACES[0],
            &format!("{}{}", point("Tower 20m", "-47.5,-15.0,0"), point("Pivot 1", "-47.6,-15.1,0")),
        );

        let parsed = KmlParser::default().parse(&content).unwrap();

        assert_eq!(parsed.transmitter.name, "Tower 20m");
        assert_eq!(parsed.transmitter.latitude, -15.0);
        assert_eq!(parsed.transmitter.longitude, -47.5);
        assert_eq!(parsed.transmitter.height_m, 20.0);
        assert_eq!(parsed.devices.len(), 1);
        assert_eq!(parsed.devices[0].latitude, -15.1);
        assert_eq!(parsed.devices[0].longitude, -47.6);
    }

    #[test]
    fn test_legacy_namespace_and_portuguese_names() {
        let content = kml(
            "http://earth.google.com/kml/2.1",
            &format!(
                "{}{}{}",
                point("Repetidora Sede", "-50.25,-12.75"),
                point("Pivô 01", "-50.3,-12.8"),
                point("PIVO 02", "-50.31,-12.81")
            ),
        );

        let parsed = KmlParser::default().parse(&content).unwrap();

        assert_eq!(parsed.transmitter.name, "Repetidora Sede");
        assert_eq!(parsed.transmitter.height_m, 10.0);
        let names: Vec<&str> = parsed.devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Pivô 01", "PIVO 02"]);
    }

    #[test]
    fn test_devices_keep_source_order() {
        let body: String = (1..=5)
            .rev()
            .map(|i| point(&format!("Pivot {}", i), &format!("-47.{},-15.{}", i, i)))
            .chain(std::iter::once(point("Antenna", "-47.0,-15.0")))
            .collect();
        let parsed = KmlParser::default()
            .parse(&kml(KML_NAMESPACES[0], &body))
            .unwrap();

        let names: Vec<&str> = parsed.devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Pivot 5", "Pivot 4", "Pivot 3", "Pivot 2", "Pivot 1"]);
    }

    #[test]
    fn test_last_transmitter_wins_and_never_doubles_as_device() {
        let body = format!(
            "{}{}{}",
            point("Tower north", "-47.1,-15.1"),
            point("Silo next to pivot 3", "-47.2,-15.2"),
            point("Pivot 3", "-47.3,-15.3")
        );
        let parsed = KmlParser::default()
            .parse(&kml(KML_NAMESPACES[0], &body))
            .unwrap();

        assert_eq!(parsed.transmitter.name, "Silo next to pivot 3");
        assert_eq!(parsed.devices.len(), 1);
        assert_eq!(parsed.devices[0].name, "Pivot 3");
    }

    #[test]
    fn test_document_without_namespace() {
        let content = format!(
            "<kml><Document><Folder>{}{}</Folder></Document></kml>",
            point("Antenna 18m", "-47.5,-15.0"),
            point("Pivot 7", "-47.6,-15.1")
        );

        let parsed = KmlParser::default().parse(&content).unwrap();

        assert_eq!(parsed.transmitter.name, "Antenna 18m");
        assert_eq!(parsed.transmitter.height_m, 18.0);
        assert_eq!(parsed.devices.len(), 1);
        assert_eq!(parsed.devices[0].name, "Pivot 7");
    }

    #[test]
    fn test_missing_transmitter_is_parse_error() {
        let content = kml(KML_NAMESPACES[0], &point("Pivot 1", "-47.6,-15.1"));
        let err = KmlParser::default().parse(&content).unwrap_err();
        assert!(matches!(err, CoverageError::ParseError { .. }));
    }

    #[test]
    fn test_malformed_markup_is_parse_error() {
        let err = KmlParser::default()
            .parse("<kml><Document><Placemark></kml>")
            .unwrap_err();
        assert!(matches!(err, CoverageError::ParseError { .. }));
    }

    #[test]
    fn test_ring_skips_malformed_tuples() {
        let ring = r#"<Placemark><name>Circle measurement pivot 2</name>
            <LineString><coordinates>
              -47.60,-15.10,0 garbage -47.61,-15.11 abc,def -47.62
              -47.63,-15.13,0
            </coordinates></LineString></Placemark>"#;
        let body = format!("{}{}", point("Antena", "-47.5,-15.0"), ring);
        let parsed = KmlParser::default()
            .parse(&kml(KML_NAMESPACES[0], &body))
            .unwrap();

        assert!(parsed.devices.is_empty());
        assert_eq!(parsed.boundary_rings.len(), 1);
        assert_eq!(
            parsed.boundary_rings[0].points,
            vec![(-15.10, -47.60), (-15.11, -47.61), (-15.13, -47.63)]
        );
    }

    #[test]
    fn test_structured_height_overrides_name() {
        let body = r#"<Placemark><name>Torre 20m</name>
            <ExtendedData><Data name="altura"><value>32</value></Data></ExtendedData>
            <Point><coordinates>-47.5,-15.0</coordinates></Point></Placemark>"#;
        let parsed = KmlParser::default()
            .parse(&kml(KML_NAMESPACES[0], body))
            .unwrap();
        assert_eq!(parsed.transmitter.height_m, 32.0);
    }

    #[test]
    fn test_custom_vocabulary() {
        let vocabulary = PlacemarkVocabulary {
            transmitter: vec!["gateway".to_string()],
            device: vec!["sensor".to_string()],
            boundary_ring: vec![],
        };
        let parser = KmlParser::new(vocabulary, HeightInference::new(15.0));
        let body = format!(
            "{}{}",
            point("LoRa Gateway", "-47.5,-15.0"),
            point("Soil sensor A", "-47.6,-15.1")
        );
        let parsed = parser.parse(&kml(KML_NAMESPACES[0], &body)).unwrap();
        assert_eq!(parsed.transmitter.height_m, 15.0);
        assert_eq!(parsed.devices[0].name, "Soil sensor A");
    }

    #[test]
    fn test_parse_lat_lon_box() {
        let content = kml(
            KML_NAMESPACES[0],
            r#"<GroundOverlay><LatLonBox>
                <north>-14.9</north><south>-15.2</south>
                <east>-47.4</east><west>-47.7</west>
            </LatLonBox></GroundOverlay>"#,
        );
        let bounds = parse_lat_lon_box(&content).unwrap();
        assert_eq!(bounds, GeoBoundingBox::new(-14.9, -15.2, -47.4, -47.7));
        assert!(parse_lat_lon_box(&kml(KML_NAMESPACES[0], "")).is_err());
    }

    #[test]
    fn test_tuple_order_is_lon_lat() {
        assert_eq!(parse_tuple("-47.5,-15.0,120"), Some((-15.0, -47.5)));
        assert_eq!(parse_tuple("-47.5"), None);
        assert_eq!(parse_tuple("x,y"), None);
    }
}
