use std::fmt;
use std::str::FromStr;

use lightsim_common::{Color, RenderSettings, SceneObject};

/// Smallest radius an edit can produce.
pub const MIN_RADIUS: f64 = 1e-3;

/// Errors from edit operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("object {0} does not exist")]
    ObjectNotFound(usize),
    #[error("unknown field {0:?}")]
    UnknownField(String),
    #[error("invalid value {value:?} for {field}")]
    InvalidValue { field: String, value: String },
}

/// Editable fields of a scene object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectField {
    X,
    Y,
    Z,
    Radius,
    Emission,
    Color,
}

impl ObjectField {
    pub const ALL: [ObjectField; 6] = [
        Self::X,
        Self::Y,
        Self::Z,
        Self::Radius,
        Self::Emission,
        Self::Color,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::Radius => "radius",
            Self::Emission => "emission",
            Self::Color => "color",
        }
    }
}

impl fmt::Display for ObjectField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObjectField {
    type Err = EditError;

    fn from_str(s: &str) -> Result<Self, EditError> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| EditError::UnknownField(s.to_owned()))
    }
}

/// A typed edit of one scene object field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectEdit {
    X(f64),
    Y(f64),
    Z(f64),
    Radius(f64),
    Emission(f64),
    Color(Color),
}

impl ObjectEdit {
    /// Parse user input for `field`.
    ///
    /// Numbers must be finite. Colors are `#rrggbb` or `r,g,b` with components
    /// clamped to [0, 255].
    pub fn parse(field: ObjectField, text: &str) -> Result<Self, EditError> {
        let invalid = || EditError::InvalidValue {
            field: field.name().to_owned(),
            value: text.to_owned(),
        };
        let number = || parse_finite(text).ok_or_else(invalid);
        Ok(match field {
            ObjectField::X => Self::X(number()?),
            ObjectField::Y => Self::Y(number()?),
            ObjectField::Z => Self::Z(number()?),
            ObjectField::Radius => Self::Radius(number()?),
            ObjectField::Emission => Self::Emission(number()?),
            ObjectField::Color => Self::Color(parse_color(text).ok_or_else(invalid)?),
        })
    }

    /// The current value of `field` on `object`, as an edit.
    pub fn read(field: ObjectField, object: &SceneObject) -> Self {
        match field {
            ObjectField::X => Self::X(object.x),
            ObjectField::Y => Self::Y(object.y),
            ObjectField::Z => Self::Z(object.z),
            ObjectField::Radius => Self::Radius(object.radius),
            ObjectField::Emission => Self::Emission(object.emission),
            ObjectField::Color => Self::Color(object.color),
        }
    }

    pub fn field(&self) -> ObjectField {
        match self {
            Self::X(_) => ObjectField::X,
            Self::Y(_) => ObjectField::Y,
            Self::Z(_) => ObjectField::Z,
            Self::Radius(_) => ObjectField::Radius,
            Self::Emission(_) => ObjectField::Emission,
            Self::Color(_) => ObjectField::Color,
        }
    }

    /// Write the value into `object`, clamping to the field's valid range.
    pub fn apply(&self, object: &mut SceneObject) {
        match *self {
            Self::X(v) => object.x = v,
            Self::Y(v) => object.y = v,
            Self::Z(v) => object.z = v,
            Self::Radius(v) => object.radius = v.max(MIN_RADIUS),
            Self::Emission(v) => object.emission = v.max(0.0),
            Self::Color(c) => object.color = c,
        }
    }
}

/// Editable render settings fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsField {
    Width,
    Height,
    MaxBounceCount,
    SamplesPerPixel,
    CameraX,
    CameraY,
    CameraZ,
    LookingAtX,
    LookingAtY,
    LookingAtZ,
}

impl SettingsField {
    pub const ALL: [SettingsField; 10] = [
        Self::Width,
        Self::Height,
        Self::MaxBounceCount,
        Self::SamplesPerPixel,
        Self::CameraX,
        Self::CameraY,
        Self::CameraZ,
        Self::LookingAtX,
        Self::LookingAtY,
        Self::LookingAtZ,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Width => "width",
            Self::Height => "height",
            Self::MaxBounceCount => "maxBounceCount",
            Self::SamplesPerPixel => "samplesPerPixel",
            Self::CameraX => "camera.x",
            Self::CameraY => "camera.y",
            Self::CameraZ => "camera.z",
            Self::LookingAtX => "lookingAt.x",
            Self::LookingAtY => "lookingAt.y",
            Self::LookingAtZ => "lookingAt.z",
        }
    }

    /// Lowest value a count field accepts.
    fn min_count(self) -> u32 {
        match self {
            Self::MaxBounceCount => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for SettingsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SettingsField {
    type Err = EditError;

    fn from_str(s: &str) -> Result<Self, EditError> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| EditError::UnknownField(s.to_owned()))
    }
}

/// A typed edit of one render settings field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingsEdit {
    Width(u32),
    Height(u32),
    MaxBounceCount(u32),
    SamplesPerPixel(u32),
    CameraX(f64),
    CameraY(f64),
    CameraZ(f64),
    LookingAtX(f64),
    LookingAtY(f64),
    LookingAtZ(f64),
}

impl SettingsEdit {
    /// Parse user input for `field`. Counts are integers clamped to their minimum.
    pub fn parse(field: SettingsField, text: &str) -> Result<Self, EditError> {
        let invalid = || EditError::InvalidValue {
            field: field.name().to_owned(),
            value: text.to_owned(),
        };
        let count = || {
            text.trim()
                .parse::<i64>()
                .map(|n| n.clamp(field.min_count() as i64, u32::MAX as i64) as u32)
                .map_err(|_| invalid())
        };
        let number = || parse_finite(text).ok_or_else(invalid);
        Ok(match field {
            SettingsField::Width => Self::Width(count()?),
            SettingsField::Height => Self::Height(count()?),
            SettingsField::MaxBounceCount => Self::MaxBounceCount(count()?),
            SettingsField::SamplesPerPixel => Self::SamplesPerPixel(count()?),
            SettingsField::CameraX => Self::CameraX(number()?),
            SettingsField::CameraY => Self::CameraY(number()?),
            SettingsField::CameraZ => Self::CameraZ(number()?),
            SettingsField::LookingAtX => Self::LookingAtX(number()?),
            SettingsField::LookingAtY => Self::LookingAtY(number()?),
            SettingsField::LookingAtZ => Self::LookingAtZ(number()?),
        })
    }

    pub fn field(&self) -> SettingsField {
        match self {
            Self::Width(_) => SettingsField::Width,
            Self::Height(_) => SettingsField::Height,
            Self::MaxBounceCount(_) => SettingsField::MaxBounceCount,
            Self::SamplesPerPixel(_) => SettingsField::SamplesPerPixel,
            Self::CameraX(_) => SettingsField::CameraX,
            Self::CameraY(_) => SettingsField::CameraY,
            Self::CameraZ(_) => SettingsField::CameraZ,
            Self::LookingAtX(_) => SettingsField::LookingAtX,
            Self::LookingAtY(_) => SettingsField::LookingAtY,
            Self::LookingAtZ(_) => SettingsField::LookingAtZ,
        }
    }

    /// Write the value into `settings`, clamping counts to their minimum.
    pub fn apply(&self, settings: &mut RenderSettings) {
        let field = self.field();
        match *self {
            Self::Width(v) => settings.width = v.max(field.min_count()),
            Self::Height(v) => settings.height = v.max(field.min_count()),
            Self::MaxBounceCount(v) => settings.max_bounce_count = v,
            Self::SamplesPerPixel(v) => settings.samples_per_pixel = v.max(field.min_count()),
            Self::CameraX(v) => settings.camera_position.x = v,
            Self::CameraY(v) => settings.camera_position.y = v,
            Self::CameraZ(v) => settings.camera_position.z = v,
            Self::LookingAtX(v) => settings.looking_at.x = v,
            Self::LookingAtY(v) => settings.looking_at.y = v,
            Self::LookingAtZ(v) => settings.looking_at.z = v,
        }
    }
}

fn parse_finite(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_color(text: &str) -> Option<Color> {
    if let Some(c) = Color::from_hex(text) {
        return Some(c);
    }
    let parts: Vec<i64> = text
        .split(',')
        .map(|p| p.trim().parse::<i64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [r, g, b] => Some(Color::clamped(*r, *g, *b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_parse_back() {
        for f in ObjectField::ALL {
            assert_eq!(f.name().parse::<ObjectField>(), Ok(f));
        }
        for f in SettingsField::ALL {
            assert_eq!(f.name().parse::<SettingsField>(), Ok(f));
        }
        assert!(matches!(
            "mass".parse::<ObjectField>(),
            Err(EditError::UnknownField(_))
        ));
    }

    #[test]
    fn parse_numeric_object_fields() {
        assert_eq!(
            ObjectEdit::parse(ObjectField::X, " -2.5 "),
            Ok(ObjectEdit::X(-2.5))
        );
        assert!(ObjectEdit::parse(ObjectField::Radius, "abc").is_err());
        assert!(ObjectEdit::parse(ObjectField::Y, "inf").is_err());
        assert!(ObjectEdit::parse(ObjectField::Z, "NaN").is_err());
    }

    #[test]
    fn parse_color_forms() {
        assert_eq!(
            ObjectEdit::parse(ObjectField::Color, "#ff8000"),
            Ok(ObjectEdit::Color(Color::new(255, 128, 0)))
        );
        assert_eq!(
            ObjectEdit::parse(ObjectField::Color, "300, -4, 17"),
            Ok(ObjectEdit::Color(Color::new(255, 0, 17)))
        );
        assert!(ObjectEdit::parse(ObjectField::Color, "1,2").is_err());
        assert!(ObjectEdit::parse(ObjectField::Color, "red").is_err());
    }

    #[test]
    fn apply_clamps_radius_and_emission() {
        let mut o = SceneObject::default();
        ObjectEdit::Radius(-3.0).apply(&mut o);
        assert_eq!(o.radius, MIN_RADIUS);
        ObjectEdit::Emission(-1.0).apply(&mut o);
        assert_eq!(o.emission, 0.0);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn read_then_apply_restores_value() {
        let mut o = SceneObject::default();
        for field in ObjectField::ALL {
            let before = ObjectEdit::read(field, &o);
            ObjectEdit::parse(field, if field == ObjectField::Color { "#010203" } else { "5" })
                .unwrap()
                .apply(&mut o);
            before.apply(&mut o);
        }
        assert_eq!(o, SceneObject::default());
    }

    #[test]
    fn settings_counts_clamp_to_minimum() {
        assert_eq!(
            SettingsEdit::parse(SettingsField::SamplesPerPixel, "0"),
            Ok(SettingsEdit::SamplesPerPixel(1))
        );
        assert_eq!(
            SettingsEdit::parse(SettingsField::MaxBounceCount, "-7"),
            Ok(SettingsEdit::MaxBounceCount(0))
        );
        assert!(SettingsEdit::parse(SettingsField::Width, "12.5").is_err());
    }

    #[test]
    fn settings_apply_camera_axes() {
        let mut s = RenderSettings::default();
        SettingsEdit::CameraY(3.0).apply(&mut s);
        SettingsEdit::LookingAtZ(-1.0).apply(&mut s);
        assert_eq!(s.camera_position.y, 3.0);
        assert_eq!(s.looking_at.z, -1.0);
        SettingsEdit::Width(0).apply(&mut s);
        assert_eq!(s.width, 1);
    }
}
