use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ThermalError};
use crate::orbit::OrbitReport;

/// `materials` / `conditions` share this shape: a `properties` table keyed by
/// record name, and an `elements` table mapping the same names to the element
/// indices they apply to. Both are insertion-order maps, not sorted ones —
/// the output JSON must preserve the input's key order, same as
/// `global_properties` does via `serde_json`'s `preserve_order` feature.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NamedRecordSection {
    #[serde(default)]
    pub properties: IndexMap<String, Map<String, Value>>,
    #[serde(default)]
    pub elements: IndexMap<String, Vec<usize>>,
}

/// The properties-atlas JSON document, matching the input/output file shape
/// verbatim: `global_properties` is opaque except for the scalar fields the
/// core itself appends, `materials` is required, `conditions` is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PropertiesDocument {
    #[serde(default)]
    pub global_properties: Map<String, Value>,
    pub materials: NamedRecordSection,
    #[serde(default)]
    pub conditions: NamedRecordSection,
}

impl PropertiesDocument {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ThermalError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| ThermalError::BadProperties {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Adds the four orbit-derived scalar fields to `global_properties`,
    /// matching the output contract: `beta_angle`, `orbital_period`,
    /// `eclipse_start`, `eclipse_end`.
    pub fn with_orbit_fields(mut self, orbit: &OrbitReport) -> Self {
        let (start, end) = orbit.eclipse.unwrap_or((-1.0, -1.0));
        self.global_properties
            .insert("beta_angle".into(), serde_json::json!(orbit.beta_angle_deg));
        self.global_properties
            .insert("orbital_period".into(), serde_json::json!(orbit.period_s));
        self.global_properties
            .insert("eclipse_start".into(), serde_json::json!(start));
        self.global_properties
            .insert("eclipse_end".into(), serde_json::json!(end));
        self
    }

    /// Builds the per-element property atlas: `material_index[i]`,
    /// `alpha_ir[i]`, `two_sides[i]` for `i` in `0..elements_amount`.
    /// Elements named by no material entry are not an error — they warn and
    /// fall back to `alpha_ir = 0`, `two_sides = false`, per the external
    /// interface contract. An element named by more than one material or
    /// condition entry, or an out-of-range element index, is `BadProperties`.
    pub fn build_atlas(&self, elements_amount: usize, path: &Path) -> Result<PropertyAtlas> {
        let bad = |reason: String| ThermalError::BadProperties {
            path: path.to_path_buf(),
            reason,
        };

        let mut material_index: Vec<Option<usize>> = vec![None; elements_amount];
        let material_names: Vec<&String> = self.materials.properties.keys().collect();

        for (name, elements) in &self.materials.elements {
            let material_pos = material_names
                .iter()
                .position(|&n| n == name)
                .ok_or_else(|| bad(format!("materials.elements names unknown material {name:?}")))?;
            for &element in elements {
                if element >= elements_amount {
                    return Err(bad(format!("material {name:?} references out-of-range element {element}")));
                }
                if material_index[element].is_some() {
                    return Err(bad(format!("element {element} claimed by more than one material")));
                }
                material_index[element] = Some(material_pos);
            }
        }

        let mut two_sides = vec![false; elements_amount];
        let mut two_sides_claimed = vec![false; elements_amount];
        for (name, elements) in &self.conditions.elements {
            let props = self
                .conditions
                .properties
                .get(name)
                .ok_or_else(|| bad(format!("conditions.elements names unknown condition {name:?}")))?;
            let flag = props
                .get("two_sides_radiation")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            for &element in elements {
                if element >= elements_amount {
                    return Err(bad(format!("condition {name:?} references out-of-range element {element}")));
                }
                if two_sides_claimed[element] {
                    return Err(bad(format!("element {element} claimed by more than one condition")));
                }
                two_sides_claimed[element] = true;
                two_sides[element] = flag;
            }
        }

        let mut alpha_ir = vec![0.0; elements_amount];
        for (i, idx) in material_index.iter().enumerate() {
            match idx {
                Some(pos) => {
                    let props = &self.materials.properties[material_names[*pos]];
                    alpha_ir[i] = props.get("alpha_ir").and_then(Value::as_f64).unwrap_or(0.0);
                }
                None => {
                    log::warn!("element {i} has no assigned material; defaulting alpha_ir=0, two_sides=false");
                }
            }
        }

        Ok(PropertyAtlas {
            material_index: material_index.into_iter().map(|m| m.map(|p| p as isize).unwrap_or(-1)).collect(),
            alpha_ir,
            two_sides,
        })
    }

    /// Serializes back to JSON, keeping arrays on a single line while object
    /// values stay multi-line and indented — matching the original atlas
    /// writer's custom pretty-printer.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let value = serde_json::to_value(self).map_err(|e| ThermalError::BadProperties {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut out = String::new();
        write_pretty(&value, 0, &mut out);
        out.push('\n');
        fs::write(path, out).map_err(|source| ThermalError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// The resolved, read-only per-element arrays the kernels query at runtime.
pub struct PropertyAtlas {
    /// Index into the materials table, or -1 when unassigned.
    pub material_index: Vec<isize>,
    pub alpha_ir: Vec<f64>,
    pub two_sides: Vec<bool>,
}

impl PropertyAtlas {
    pub fn alpha_ir(&self, element: usize) -> f64 {
        self.alpha_ir[element]
    }

    pub fn two_sides(&self, element: usize) -> bool {
        self.two_sides[element]
    }
}

const INDENT: &str = "  ";

/// Pretty-prints a `serde_json::Value`, keeping arrays on a single line
/// while objects stay multi-line and indented — the one deviation from
/// `serde_json`'s own pretty-printer that the original atlas writer's custom
/// JSON encoder made, to keep numeric/element-id lists compact.
fn write_pretty(value: &Value, depth: usize, out: &mut String) {
    match value {
        Value::Object(map) => {
            if map.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{\n");
            let last = map.len() - 1;
            for (i, (key, val)) in map.iter().enumerate() {
                out.push_str(&INDENT.repeat(depth + 1));
                out.push_str(&serde_json::to_string(key).unwrap());
                out.push_str(": ");
                write_pretty(val, depth + 1, out);
                if i != last {
                    out.push(',');
                }
                out.push('\n');
            }
            out.push_str(&INDENT.repeat(depth));
            out.push('}');
        }
        Value::Array(_) => {
            out.push_str(&serde_json::to_string(value).unwrap());
        }
        _ => out.push_str(&serde_json::to_string(value).unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> PropertiesDocument {
        serde_json::from_str(
            r#"{
                "global_properties": {"orbit_divisions": 4},
                "materials": {
                    "properties": {
                        "white_paint": {"alpha_ir": 0.9},
                        "mli": {"alpha_ir": 0.1}
                    },
                    "elements": {
                        "white_paint": [0, 1],
                        "mli": [2]
                    }
                },
                "conditions": {
                    "properties": {
                        "wrap": {"two_sides_radiation": true}
                    },
                    "elements": {
                        "wrap": [2]
                    }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn builds_atlas_from_materials_and_conditions() {
        let doc = sample_document();
        let atlas = doc.build_atlas(3, Path::new("properties.json")).unwrap();
        assert!((atlas.alpha_ir(0) - 0.9).abs() < 1e-12);
        assert!((atlas.alpha_ir(2) - 0.1).abs() < 1e-12);
        assert!(atlas.two_sides(2));
        assert!(!atlas.two_sides(0));
    }

    #[test]
    fn unassigned_element_defaults_without_error() {
        let doc = sample_document();
        let atlas = doc.build_atlas(4, Path::new("properties.json")).unwrap();
        assert_eq!(atlas.material_index[3], -1);
        assert!((atlas.alpha_ir(3) - 0.0).abs() < 1e-12);
        assert!(!atlas.two_sides(3));
    }

    #[test]
    fn rejects_element_claimed_by_two_materials() {
        let mut doc = sample_document();
        doc.materials
            .elements
            .get_mut("mli")
            .unwrap()
            .push(0);
        let err = doc.build_atlas(3, Path::new("properties.json")).unwrap_err();
        assert!(matches!(err, ThermalError::BadProperties { .. }));
    }

    #[test]
    fn pretty_print_keeps_arrays_single_line() {
        let doc = sample_document();
        let value = serde_json::to_value(&doc).unwrap();
        let mut out = String::new();
        write_pretty(&value, 0, &mut out);
        assert!(out.contains("[0,1]"));
        assert!(!out.contains("[\n"));
    }
}
