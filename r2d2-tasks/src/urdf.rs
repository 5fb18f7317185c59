use r2d2_physics::Shape;
use roxmltree::{Document, Node};

use crate::error::UrdfError;

const R2D2_URDF: &str = include_str!("../assets/r2d2.urdf");

pub const BASE_LINK: &str = "base";

// Gap left under the base when placing it on a surface.
const START_CLEARANCE: f32 = 0.01;

/// The part of a robot description the task suite drives: one rigid base.
#[derive(Clone, Debug, PartialEq)]
pub struct RobotSpec {
    pub name: String,
    pub shape: Shape,
    pub mass: f32,
    pub color: [f32; 4],
}

impl RobotSpec {
    /// The bundled R2D2 description.
    pub fn r2d2() -> Result<Self, UrdfError> {
        Self::from_urdf(R2D2_URDF, BASE_LINK)
    }

    pub fn from_urdf(urdf_content: &str, link_name: &str) -> Result<Self, UrdfError> {
        let doc = Document::parse(urdf_content)?;
        let robot_name = doc
            .root_element()
            .attribute("name")
            .unwrap_or("robot")
            .to_string();

        let link = doc
            .descendants()
            .find(|n| n.has_tag_name("link") && n.attribute("name") == Some(link_name))
            .ok_or_else(|| UrdfError::MissingLink(link_name.to_string()))?;

        let geometry = child(link, "collision")
            .and_then(|c| child(c, "geometry"))
            .or_else(|| child(link, "visual").and_then(|v| child(v, "geometry")))
            .ok_or_else(|| UrdfError::MissingGeometry {
                link: link_name.to_string(),
            })?;
        let shape = parse_shape(geometry, link_name)?;

        let mass = match child(link, "inertial").and_then(|i| child(i, "mass")) {
            Some(node) => parse_scalar(node, "value", link_name)?,
            None => 1.0,
        };

        let color = child(link, "visual")
            .and_then(|v| child(v, "material"))
            .and_then(|m| child(m, "color"))
            .and_then(|c| c.attribute("rgba"))
            .and_then(|rgba| {
                let v = parse_floats(rgba);
                (v.len() == 4).then(|| [v[0], v[1], v[2], v[3]])
            })
            .unwrap_or([0.8, 0.8, 0.8, 1.0]);

        Ok(Self {
            name: robot_name,
            shape,
            mass,
            color,
        })
    }

    /// Height of the base centre above the surface it starts on.
    pub fn start_height(&self) -> f32 {
        self.shape.local_half_extents().z + START_CLEARANCE
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn parse_floats(text: &str) -> Vec<f32> {
    text.split_whitespace()
        .filter_map(|s| s.parse::<f32>().ok())
        .collect()
}

fn parse_scalar(node: Node, attribute: &'static str, link: &str) -> Result<f32, UrdfError> {
    let raw = node.attribute(attribute).unwrap_or_default();
    raw.trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| UrdfError::BadAttribute {
            link: link.to_string(),
            attribute,
            value: raw.to_string(),
        })
}

fn parse_shape(geometry: Node, link: &str) -> Result<Shape, UrdfError> {
    if let Some(box_geom) = child(geometry, "box") {
        let raw = box_geom.attribute("size").unwrap_or_default();
        let dims = parse_floats(raw);
        if dims.len() != 3 || dims.iter().any(|d| *d <= 0.0) {
            return Err(UrdfError::BadAttribute {
                link: link.to_string(),
                attribute: "size",
                value: raw.to_string(),
            });
        }
        return Ok(Shape::cuboid(dims[0] / 2.0, dims[1] / 2.0, dims[2] / 2.0));
    }
    if let Some(cylinder) = child(geometry, "cylinder") {
        return Ok(Shape::Cylinder {
            radius: parse_scalar(cylinder, "radius", link)?,
            height: parse_scalar(cylinder, "length", link)?,
        });
    }
    if let Some(sphere) = child(geometry, "sphere") {
        return Ok(Shape::Sphere {
            radius: parse_scalar(sphere, "radius", link)?,
        });
    }
    Err(UrdfError::MissingGeometry {
        link: link.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_r2d2_base() {
        let spec = RobotSpec::r2d2().unwrap();
        assert_eq!(spec.name, "r2d2");
        assert_eq!(spec.mass, 10.0);
        assert_eq!(
            spec.shape,
            Shape::Cylinder {
                radius: 0.2,
                height: 0.6
            }
        );
        assert!((spec.start_height() - 0.31).abs() < 1e-6);
    }

    #[test]
    fn test_box_link_without_inertial() {
        let urdf = r#"<robot name="crate"><link name="base">
            <collision><geometry><box size="0.4 0.2 0.1"/></geometry></collision>
        </link></robot>"#;
        let spec = RobotSpec::from_urdf(urdf, "base").unwrap();
        assert_eq!(spec.shape, Shape::cuboid(0.2, 0.1, 0.05));
        assert_eq!(spec.mass, 1.0);
    }

    #[test]
    fn test_missing_link_is_reported() {
        let err = RobotSpec::from_urdf(r#"<robot name="x"/>"#, "base").unwrap_err();
        assert!(matches!(err, UrdfError::MissingLink(name) if name == "base"));
    }

    #[test]
    fn test_bad_box_size_is_reported() {
        let urdf = r#"<robot name="x"><link name="base">
            <collision><geometry><box size="0.4 0.2"/></geometry></collision>
        </link></robot>"#;
        let err = RobotSpec::from_urdf(urdf, "base").unwrap_err();
        assert!(matches!(err, UrdfError::BadAttribute { attribute: "size", .. }));
    }
}
