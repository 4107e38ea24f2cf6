//! Keyword lookup from a natural-language prompt to a template model.
//!
//! Used when the AI generator is unavailable, and by the browser to seed the
//! script editor. Matching is a plain substring search over a fixed table,
//! checked in order.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Cone,
    Sphere,
    Cylinder,
    Ring,
    Gear,
    Star,
    Hexagon,
    Stairs,
    Cross,
    Box,
}

const KEYWORDS: &[(ShapeKind, &[&str])] = &[
    (ShapeKind::Cone, &["cone", "triangle", "pyramid"]),
    (ShapeKind::Sphere, &["sphere", "ball", "round", "orb"]),
    (ShapeKind::Cylinder, &["cylinder", "tube", "pipe", "rod"]),
    (ShapeKind::Ring, &["ring", "washer", "hole", "donut", "torus"]),
    (ShapeKind::Gear, &["gear", "cog", "teeth", "sprocket"]),
    (ShapeKind::Star, &["star", "asterisk"]),
    (ShapeKind::Hexagon, &["hexagon", "hex", "nut", "bolt"]),
    (ShapeKind::Stairs, &["stairs", "staircase", "steps"]),
    (ShapeKind::Cross, &["cross", "plus", "+"]),
];

impl ShapeKind {
    pub fn from_prompt(prompt: &str) -> Self {
        let lower = prompt.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(kind, _)| *kind)
            .unwrap_or(ShapeKind::Box)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ShapeKind::Cone => "cone",
            ShapeKind::Sphere => "sphere",
            ShapeKind::Cylinder => "cylinder",
            ShapeKind::Ring => "ring",
            ShapeKind::Gear => "gear",
            ShapeKind::Star => "star",
            ShapeKind::Hexagon => "hexagon",
            ShapeKind::Stairs => "staircase",
            ShapeKind::Cross => "cross",
            ShapeKind::Box => "box",
        }
    }
}

/// Program for the server-side solid-modeling DSL
pub fn dsl_template(kind: ShapeKind) -> &'static str {
    match kind {
        ShapeKind::Cone => {
            "from badcad import *\n\
             # Simple cone (AI service temporarily unavailable)\n\
             base = circle(r=10)\n\
             tip = circle(r=0.5)\n\
             model = base.extrude_to(tip, 15)"
        }
        ShapeKind::Sphere => {
            "from badcad import *\n\
             # Simple sphere (AI service temporarily unavailable)\n\
             model = sphere(r=8)"
        }
        ShapeKind::Cylinder => {
            "from badcad import *\n\
             # Simple cylinder (AI service temporarily unavailable)\n\
             model = cylinder(h=20, r=6)"
        }
        ShapeKind::Ring => {
            "from badcad import *\n\
             # Simple ring (AI service temporarily unavailable)\n\
             outer = circle(r=10)\n\
             inner = circle(r=5)\n\
             ring = outer - inner\n\
             model = ring.extrude(5)"
        }
        ShapeKind::Gear => {
            "from badcad import *\n\
             # Simple gear (AI service temporarily unavailable)\n\
             import math\n\
             outer = circle(r=12)\n\
             inner = circle(r=8)\n\
             gear_base = outer - inner\n\
             for i in range(12):\n    \
                 angle = i * math.pi / 6\n    \
                 tooth = square(1, 3, center=True)\n    \
                 tooth = tooth.move(x=10*math.cos(angle), y=10*math.sin(angle))\n    \
                 gear_base = gear_base + tooth\n\
             model = gear_base.extrude(5)"
        }
        ShapeKind::Star => {
            "from badcad import *\n\
             # Simple star (AI service temporarily unavailable)\n\
             import math\n\
             points = []\n\
             for i in range(10):\n    \
                 angle = i * math.pi / 5\n    \
                 r = 10 if i % 2 == 0 else 5\n    \
                 points.append((r * math.cos(angle), r * math.sin(angle)))\n\
             star = polygon(points)\n\
             model = star.extrude(3)"
        }
        ShapeKind::Hexagon => {
            "from badcad import *\n\
             # Simple hexagon (AI service temporarily unavailable)\n\
             hex_shape = circle(r=10, fn=6)\n\
             model = hex_shape.extrude(5)"
        }
        ShapeKind::Stairs => {
            "from badcad import *\n\
             # Simple staircase (AI service temporarily unavailable)\n\
             step_width = 30\n\
             step_depth = 20\n\
             step_height = 8\n\
             \n\
             step1 = cube(step_width, step_depth, step_height, center=True)\n\
             step2 = cube(step_width, step_depth, step_height, center=True).move(0, step_depth, step_height)\n\
             step3 = cube(step_width, step_depth, step_height, center=True).move(0, step_depth*2, step_height*2)\n\
             \n\
             model = step1 + step2 + step3"
        }
        ShapeKind::Cross => {
            "from badcad import *\n\
             # Simple cross (AI service temporarily unavailable)\n\
             horizontal = square(30, 10, center=True)\n\
             vertical = square(10, 30, center=True)\n\
             cross = horizontal + vertical\n\
             model = cross.extrude(5)"
        }
        ShapeKind::Box => {
            "from badcad import *\n\
             # Simple box (AI service temporarily unavailable)\n\
             box = square(15, 15, center=True)\n\
             model = box.extrude(8)"
        }
    }
}

/// Script for the primitive-combination surface
pub fn script_template(kind: ShapeKind) -> &'static str {
    match kind {
        ShapeKind::Cone => "model = cone(10, 15)",
        ShapeKind::Sphere => "model = sphere(8)",
        ShapeKind::Cylinder => "model = cylinder(6, 20)",
        ShapeKind::Ring => "model = torus(10, 2.5)",
        ShapeKind::Gear => {
            "disc = difference(cylinder(10, 5), cylinder(4, 6));\n\
             bar = cube(26, 3, 5);\n\
             teeth = union(bar, union(rotate(bar, 0, 0, 60), rotate(bar, 0, 0, 120)));\n\
             model = union(disc, teeth)"
        }
        ShapeKind::Star => {
            "arm = cube(20, 4, 3);\n\
             model = union(arm, union(rotate(arm, 0, 0, 72), union(rotate(arm, 0, 0, 144), \
             union(rotate(arm, 0, 0, 216), rotate(arm, 0, 0, 288)))))"
        }
        ShapeKind::Hexagon => "model = difference(cylinder(10, 5), cylinder(5, 6))",
        ShapeKind::Stairs => {
            "w = 30; d = 20; h = 8;\n\
             step1 = cube(w, d, h);\n\
             step2 = translate(cube(w, d, h), 0, d, h);\n\
             step3 = translate(cube(w, d, h), 0, d * 2, h * 2);\n\
             model = union(step1, union(step2, step3))"
        }
        ShapeKind::Cross => "model = union(cube(30, 10, 5), cube(10, 30, 5))",
        ShapeKind::Box => "model = cube(15, 15, 8)",
    }
}

/// Hardcoded last-resort DSL program
pub const DEFAULT_DSL_PROGRAM: &str = "from badcad import *\n\
                                       # Simple box\n\
                                       box = square(20, 20, center=True)\n\
                                       model = box.extrude(10)";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_pick_shapes() {
        assert_eq!(ShapeKind::from_prompt("a tall CONE"), ShapeKind::Cone);
        assert_eq!(ShapeKind::from_prompt("make a ball"), ShapeKind::Sphere);
        assert_eq!(ShapeKind::from_prompt("metal pipe"), ShapeKind::Cylinder);
        assert_eq!(ShapeKind::from_prompt("a washer"), ShapeKind::Ring);
        assert_eq!(ShapeKind::from_prompt("12 tooth sprocket"), ShapeKind::Gear);
        assert_eq!(ShapeKind::from_prompt("m8 nut"), ShapeKind::Hexagon);
        assert_eq!(ShapeKind::from_prompt("three steps"), ShapeKind::Stairs);
        assert_eq!(ShapeKind::from_prompt("a + sign"), ShapeKind::Cross);
        assert_eq!(ShapeKind::from_prompt("something"), ShapeKind::Box);
    }

    #[test]
    fn earlier_rows_win() {
        // "pyramid" (cone) is checked before "hole" (ring)
        assert_eq!(ShapeKind::from_prompt("pyramid with a hole"), ShapeKind::Cone);
    }

    #[test]
    fn dsl_templates_define_model() {
        for (kind, _) in KEYWORDS {
            let code = dsl_template(*kind);
            assert!(code.starts_with("from badcad import *"));
            assert!(code.contains("model ="));
        }
        assert!(dsl_template(ShapeKind::Box).contains("model ="));
        assert!(DEFAULT_DSL_PROGRAM.contains("model ="));
    }

    #[test]
    fn gear_template_keeps_indentation() {
        let code = dsl_template(ShapeKind::Gear);
        assert!(code.contains("\n    angle = i * math.pi / 6\n"));
    }

    #[test]
    fn script_templates_assign_model() {
        for (kind, _) in KEYWORDS {
            assert!(script_template(*kind).contains("model ="), "{:?}", kind);
        }
    }
}
