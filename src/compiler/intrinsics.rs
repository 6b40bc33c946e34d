//! Native implementations of library functions.
//!
//! Library functions are declared in `.logic` files without a usable body.
//! Calls to them are evaluated by looking up the function's qualified name
//! here. Arguments arrive in parameter order.

use super::evaluate::{EvaluationError, Memory, Value};
use super::types::Unification;
use std::collections::HashMap;

pub type Implementation = fn(&[Value]) -> Result<Value, EvaluationError>;

#[derive(Debug, Clone, Copy)]
pub struct Intrinsic {
    pub arity: usize,
    pub implementation: Implementation,
}

impl Intrinsic {
    pub fn call(&self, name: &str, arguments: &[Value]) -> Result<Value, EvaluationError> {
        if arguments.len() != self.arity {
            return Err(EvaluationError::ArityMismatch {
                name: name.to_string(),
                expected: self.arity,
                found: arguments.len(),
            });
        }
        (self.implementation)(arguments)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Intrinsics {
    functions: HashMap<String, Intrinsic>,
}

impl Intrinsics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every function the bundled libraries declare.
    pub fn standard() -> Self {
        let mut intrinsics = Self::new();
        intrinsics.register("Boolean.and", 2, boolean_and);
        intrinsics.register("Boolean.or", 2, boolean_or);
        intrinsics.register("String.concat", 2, string_concat);
        intrinsics.register("Number.range", 3, number_range);
        intrinsics.register("Array.at", 2, array_at);
        intrinsics.register("Optional.value", 1, optional_value);
        intrinsics.register("Color.saturate", 2, color_saturate);
        intrinsics.register("Color.setHue", 2, color_set_hue);
        intrinsics.register("Color.setSaturation", 2, color_set_saturation);
        intrinsics.register("Color.setLightness", 2, color_set_lightness);
        intrinsics.register("Color.fromHSL", 3, color_from_hsl);
        intrinsics
    }

    pub fn register(&mut self, name: &str, arity: usize, implementation: Implementation) {
        self.functions.insert(
            name.to_string(),
            Intrinsic {
                arity,
                implementation,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Intrinsic> {
        self.functions.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

const ORDINALS: [&str; 3] = ["first", "second", "third"];

fn invalid(function: &str, position: usize, expected: &str) -> EvaluationError {
    let ordinal = ORDINALS.get(position).copied().unwrap_or("last");
    EvaluationError::InvalidArgument(format!(
        "the {} argument of `{}` needs to be {}",
        ordinal, function, expected
    ))
}

fn bool_at(arguments: &[Value], position: usize, function: &str) -> Result<bool, EvaluationError> {
    match arguments.get(position).map(|value| &value.memory) {
        Some(Memory::Bool(value)) => Ok(*value),
        _ => Err(invalid(function, position, "a boolean")),
    }
}

fn number_at(arguments: &[Value], position: usize, function: &str) -> Result<f64, EvaluationError> {
    match arguments.get(position).map(|value| &value.memory) {
        Some(Memory::Number(value)) => Ok(*value),
        _ => Err(invalid(function, position, "a number")),
    }
}

fn string_at<'v>(
    arguments: &'v [Value],
    position: usize,
    function: &str,
) -> Result<&'v str, EvaluationError> {
    match arguments.get(position).map(|value| &value.memory) {
        Some(Memory::String(value)) => Ok(value),
        _ => Err(invalid(function, position, "a string")),
    }
}

fn color_at(arguments: &[Value], position: usize, function: &str) -> Result<Hsl, EvaluationError> {
    arguments
        .get(position)
        .and_then(Value::as_color)
        .and_then(Hsl::parse)
        .ok_or_else(|| invalid(function, position, "a color"))
}

fn boolean_and(arguments: &[Value]) -> Result<Value, EvaluationError> {
    let a = bool_at(arguments, 0, "Boolean.and")?;
    let b = bool_at(arguments, 1, "Boolean.and")?;
    Ok(Value::bool(a && b))
}

fn boolean_or(arguments: &[Value]) -> Result<Value, EvaluationError> {
    let a = bool_at(arguments, 0, "Boolean.or")?;
    let b = bool_at(arguments, 1, "Boolean.or")?;
    Ok(Value::bool(a || b))
}

fn string_concat(arguments: &[Value]) -> Result<Value, EvaluationError> {
    let a = string_at(arguments, 0, "String.concat")?;
    let b = string_at(arguments, 1, "String.concat")?;
    Ok(Value::string(&format!("{}{}", a, b)))
}

fn number_range(arguments: &[Value]) -> Result<Value, EvaluationError> {
    let from = number_at(arguments, 0, "Number.range")?;
    let to = number_at(arguments, 1, "Number.range")?;
    let by = number_at(arguments, 2, "Number.range")?;
    if by == 0.0 || !by.is_finite() {
        return Err(EvaluationError::InvalidArgument(
            "the step of `Number.range` needs to be a non-zero number".to_string(),
        ));
    }
    let mut values = Vec::new();
    let mut current = from;
    while (by > 0.0 && current < to) || (by < 0.0 && current > to) {
        values.push(Value::number(current));
        current += by;
    }
    Ok(Value::new(
        Unification::array(Unification::number()),
        Memory::Array(values),
    ))
}

fn array_at(arguments: &[Value]) -> Result<Value, EvaluationError> {
    let Some(Memory::Array(values)) = arguments.first().map(|value| &value.memory) else {
        return Err(invalid("Array.at", 0, "an array"));
    };
    let index = number_at(arguments, 1, "Array.at")?;
    if index < 0.0 || index.fract() != 0.0 {
        return Err(invalid("Array.at", 1, "a non-negative integer"));
    }
    values.get(index as usize).cloned().ok_or_else(|| {
        EvaluationError::InvalidArgument(format!(
            "index {} is out of bounds for an array of length {}",
            index,
            values.len()
        ))
    })
}

fn optional_value(arguments: &[Value]) -> Result<Value, EvaluationError> {
    arguments
        .first()
        .cloned()
        .ok_or_else(|| invalid("Optional.value", 0, "a value"))
}

fn color_saturate(arguments: &[Value]) -> Result<Value, EvaluationError> {
    let color = color_at(arguments, 0, "Color.saturate")?;
    let ratio = number_at(arguments, 1, "Color.saturate")?;
    let saturation = color.saturation + color.saturation * ratio;
    Ok(Value::color(&color.with_saturation(saturation).to_hex()))
}

fn color_set_hue(arguments: &[Value]) -> Result<Value, EvaluationError> {
    let color = color_at(arguments, 0, "Color.setHue")?;
    let hue = number_at(arguments, 1, "Color.setHue")?;
    Ok(Value::color(&color.with_hue(hue).to_hex()))
}

fn color_set_saturation(arguments: &[Value]) -> Result<Value, EvaluationError> {
    let color = color_at(arguments, 0, "Color.setSaturation")?;
    let saturation = number_at(arguments, 1, "Color.setSaturation")?;
    Ok(Value::color(&color.with_saturation(saturation / 100.0).to_hex()))
}

fn color_set_lightness(arguments: &[Value]) -> Result<Value, EvaluationError> {
    let color = color_at(arguments, 0, "Color.setLightness")?;
    let lightness = number_at(arguments, 1, "Color.setLightness")?;
    Ok(Value::color(&color.with_lightness(lightness / 100.0).to_hex()))
}

fn color_from_hsl(arguments: &[Value]) -> Result<Value, EvaluationError> {
    let hue = number_at(arguments, 0, "Color.fromHSL")?;
    let saturation = number_at(arguments, 1, "Color.fromHSL")?;
    let lightness = number_at(arguments, 2, "Color.fromHSL")?;
    let color = Hsl {
        hue: 0.0,
        saturation: 0.0,
        lightness: 0.0,
    }
    .with_hue(hue)
    .with_saturation(saturation / 100.0)
    .with_lightness(lightness / 100.0);
    Ok(Value::color(&color.to_hex()))
}

/// Hue in degrees, saturation and lightness in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Hsl {
    hue: f64,
    saturation: f64,
    lightness: f64,
}

impl Hsl {
    /// Parse `#rgb` or `#rrggbb`.
    fn parse(css: &str) -> Option<Hsl> {
        let hex = css.trim().strip_prefix('#')?;
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|c| c as f64 / 255.0);
        let (r, g, b) = match hex.len() {
            3 => {
                let doubled: Vec<String> = hex.chars().map(|c| format!("{}{}", c, c)).collect();
                (
                    channel(&doubled[0])?,
                    channel(&doubled[1])?,
                    channel(&doubled[2])?,
                )
            }
            6 => (
                channel(hex.get(0..2)?)?,
                channel(hex.get(2..4)?)?,
                channel(hex.get(4..6)?)?,
            ),
            _ => return None,
        };
        Some(Hsl::from_rgb(r, g, b))
    }

    fn from_rgb(r: f64, g: f64, b: f64) -> Hsl {
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let lightness = (max + min) / 2.0;
        let delta = max - min;
        if delta == 0.0 {
            return Hsl {
                hue: 0.0,
                saturation: 0.0,
                lightness,
            };
        }
        let saturation = delta / (1.0 - (2.0 * lightness - 1.0).abs());
        let hue = if max == r {
            60.0 * (((g - b) / delta).rem_euclid(6.0))
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        Hsl {
            hue,
            saturation,
            lightness,
        }
    }

    fn to_rgb(self) -> (f64, f64, f64) {
        let chroma = (1.0 - (2.0 * self.lightness - 1.0).abs()) * self.saturation;
        let sector = self.hue / 60.0;
        let x = chroma * (1.0 - (sector.rem_euclid(2.0) - 1.0).abs());
        let (r, g, b) = match sector as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = self.lightness - chroma / 2.0;
        (r + m, g + m, b + m)
    }

    fn to_hex(self) -> String {
        let (r, g, b) = self.to_rgb();
        let byte = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02X}{:02X}{:02X}", byte(r), byte(g), byte(b))
    }

    fn with_hue(self, hue: f64) -> Hsl {
        Hsl {
            hue: hue.rem_euclid(360.0),
            ..self
        }
    }

    fn with_saturation(self, saturation: f64) -> Hsl {
        Hsl {
            saturation: saturation.clamp(0.0, 1.0),
            ..self
        }
    }

    fn with_lightness(self, lightness: f64) -> Hsl {
        Hsl {
            lightness: lightness.clamp(0.0, 1.0),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: Vec<Value>) -> Result<Value, EvaluationError> {
        let intrinsics = Intrinsics::standard();
        let intrinsic = intrinsics.get(name).unwrap();
        intrinsic.call(name, &arguments)
    }

    fn css(value: &Value) -> &str {
        value.as_color().unwrap()
    }

    #[test]
    fn test_boolean() {
        assert_eq!(
            call("Boolean.and", vec![Value::bool(true), Value::bool(false)]),
            Ok(Value::bool(false))
        );
        assert_eq!(
            call("Boolean.or", vec![Value::bool(true), Value::bool(false)]),
            Ok(Value::bool(true))
        );
        assert_eq!(
            call("Boolean.and", vec![Value::number(1.0), Value::bool(false)]),
            Err(EvaluationError::InvalidArgument(
                "the first argument of `Boolean.and` needs to be a boolean".to_string()
            ))
        );
    }

    #[test]
    fn test_arity() {
        assert_eq!(
            call("String.concat", vec![Value::string("a")]),
            Err(EvaluationError::ArityMismatch {
                name: "String.concat".to_string(),
                expected: 2,
                found: 1,
            })
        );
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(
            call("String.concat", vec![Value::string("foo"), Value::string("bar")]),
            Ok(Value::string("foobar"))
        );
    }

    #[test]
    fn test_range_and_at() {
        let range = call(
            "Number.range",
            vec![Value::number(0.0), Value::number(10.0), Value::number(4.0)],
        )
        .unwrap();
        assert_eq!(
            range.memory,
            Memory::Array(vec![
                Value::number(0.0),
                Value::number(4.0),
                Value::number(8.0)
            ])
        );
        assert_eq!(
            call("Array.at", vec![range.clone(), Value::number(1.0)]),
            Ok(Value::number(4.0))
        );
        assert!(matches!(
            call("Array.at", vec![range, Value::number(3.0)]),
            Err(EvaluationError::InvalidArgument(_))
        ));
        assert!(call(
            "Number.range",
            vec![Value::number(0.0), Value::number(1.0), Value::number(0.0)]
        )
        .is_err());
    }

    #[test]
    fn test_color_roundtrip() {
        for hex in ["#FF0000", "#00FF00", "#0000FF", "#336699", "#FFFFFF", "#000000"] {
            assert_eq!(Hsl::parse(hex).unwrap().to_hex(), hex);
        }
        assert_eq!(Hsl::parse("#f00").unwrap().to_hex(), "#FF0000");
        assert_eq!(Hsl::parse("red"), None);
    }

    #[test]
    fn test_color_functions() {
        let red = Value::color("#FF0000");
        let blue = call("Color.setHue", vec![red.clone(), Value::number(240.0)]).unwrap();
        assert_eq!(css(&blue), "#0000FF");

        let gray = call("Color.setSaturation", vec![red.clone(), Value::number(0.0)]).unwrap();
        assert_eq!(css(&gray), "#808080");

        let white = call("Color.setLightness", vec![red, Value::number(100.0)]).unwrap();
        assert_eq!(css(&white), "#FFFFFF");

        let green = call(
            "Color.fromHSL",
            vec![Value::number(120.0), Value::number(100.0), Value::number(50.0)],
        )
        .unwrap();
        assert_eq!(css(&green), "#00FF00");
    }

    #[test]
    fn test_saturate() {
        // Roughly hsl(0, 50%, 50%); tripling the saturation clamps it at 100%.
        let muted = Value::color("#BF4040");
        let vivid = call("Color.saturate", vec![muted, Value::number(2.0)]).unwrap();
        assert_eq!(css(&vivid), "#FF0000");
        assert_eq!(vivid.ty, Unification::color());
        assert!(call("Color.saturate", vec![Value::string("#FFF"), Value::number(1.0)]).is_err());
    }
}
