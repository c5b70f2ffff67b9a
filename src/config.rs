//! Configuration file parser: grid, response model and event-queue tuning.
//!
//! Physical quantities are written as strings with explicit units, e.g.
//! `"2 degrees"`, `"20 cm"` or `"10 ms"`, and parsed by `uom`.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, de};

use geometry::Vector;
use units::{cm_, deg, ms_, radian_, ratio, Angle, Length, Time};

use crate::backprojector::NearFieldTuning;
use crate::error::{Error, Result};
use crate::grid::{AxisBins, Grid, GridKind, FAR_AWAY};
use crate::queue::QueueSettings;
use crate::response::{self, ConeShapes, FixedGaussian, Response, ResponseMatrix, UncertaintyGaussian};

fn deserialize_uom<'d, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    String::deserialize(deserializer)?
        .parse::<T>()
        .map_err(de::Error::custom)
}

fn deserialize_uom_opt<'d, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    Option::<String>::deserialize(deserializer)?
        .map(|s| s.parse::<T>())
        .transpose()
        .map_err(de::Error::custom)
}

fn deserialize_uom_3d_opt<'d, D, T>(deserializer: D) -> std::result::Result<Option<(T, T, T)>, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    Option::<(String, String, String)>::deserialize(deserializer)?
        .map(|(x, y, z)| tr_tup_res((x.parse(), y.parse(), z.parse())))
        .transpose()
        .map_err(de::Error::custom)
}

/// Angle, or `"no"` for none
fn deserialize_maybe_cutoff<'d, D>(deserializer: D) -> std::result::Result<Option<Angle>, D::Error>
where
    D: Deserializer<'d>,
{
    crate::utils::parse_maybe_cutoff(&String::deserialize(deserializer)?)
        .map_err(de::Error::custom)
}

/// Transpose 3-tuple of `Result`: `Ok` if all elements are `Ok`, otherwise
/// the first `Err`.
fn tr_tup_res<O, E>((x,y,z): (std::result::Result<O, E>, std::result::Result<O, E>, std::result::Result<O, E>))
                    -> std::result::Result<(O, O, O), E> {
    Ok((x?, y?, z?))
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub grid: GridConfig,
    pub response: ResponseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

// ----- Grid ------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GridType {
    Spherical,
    NearField,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Axis<T>
where
    T : FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    #[serde(deserialize_with = "deserialize_uom")]
    pub min: T,
    #[serde(deserialize_with = "deserialize_uom")]
    pub max: T,
    pub bins: usize,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    #[serde(rename = "type")]
    pub kind: GridType,

    pub phi: Axis<Angle>,
    pub theta: Axis<Angle>,

    /// Mandatory for near-field grids; far-field grids default to one
    /// distant shell
    pub radius: Option<Axis<Length>>,

    /// Image x and z axes in detector coordinates
    pub x_axis: Option<[f64; 3]>,
    pub z_axis: Option<[f64; 3]>,

    /// Image origin in detector coordinates (near-field only)
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_uom_3d_opt")]
    pub translation: Option<(Length, Length, Length)>,

    #[serde(default = "default_off_axis_cutoff")]
    #[serde(deserialize_with = "deserialize_maybe_cutoff")]
    pub off_axis_cutoff: Option<Angle>,

    #[serde(default = "default_true")]
    pub distance_weighting: bool,
}

fn default_off_axis_cutoff() -> Option<Angle> { Some(deg(60.0)) }
fn default_true() -> bool { true }

impl GridConfig {
    pub fn near_field_tuning(&self) -> NearFieldTuning {
        NearFieldTuning {
            off_axis_cutoff: self.off_axis_cutoff.map(radian_),
            distance_weighting: self.distance_weighting,
        }
    }
}

impl Grid {

    /// Build (but do not prepare) the grid described by `config`
    pub fn from_config(config: &GridConfig) -> Result<Self> {
        let angular = |a: &Axis<Angle>| AxisBins::angular(a.min, a.max, a.bins);
        let (kind, radius) = match (config.kind, &config.radius) {
            (GridType::Spherical, None) => (GridKind::Spherical, AxisBins::new(FAR_AWAY / 10.0, FAR_AWAY, 1)),
            (GridType::Spherical, Some(r)) => (GridKind::Spherical, AxisBins::radial(r.min, r.max, r.bins)),
            (GridType::NearField, Some(r)) => (GridKind::NearFieldSpherical, AxisBins::radial(r.min, r.max, r.bins)),
            (GridType::NearField, None) => return Err(Error::InvalidDimension {
                axis: "radius",
                reason: "near-field grids need an explicit radius axis".into(),
            }),
        };
        let mut grid = Grid::new(kind, angular(&config.phi), angular(&config.theta), radius)?;
        match (config.x_axis, config.z_axis) {
            (None, None) => {}
            (x, z) => {
                let x = x.map_or(Vector::x(), Vector::from);
                let z = z.map_or(Vector::z(), Vector::from);
                grid.set_rotation(x, z)?;
            }
        }
        if let Some((x, y, z)) = config.translation {
            grid.set_translation(Vector::new(cm_(x), cm_(y), cm_(z)));
        }
        Ok(grid)
    }
}

// ----- Response --------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum ResponseConfig {
    FixedGaussian {
        #[serde(deserialize_with = "deserialize_uom")]
        transversal: Angle,
        #[serde(deserialize_with = "deserialize_uom")]
        longitudinal: Angle,
        #[serde(deserialize_with = "deserialize_uom")]
        pair: Angle,
        /// Width of PET lines of response, enabling PET events
        #[serde(default)]
        #[serde(deserialize_with = "deserialize_uom_opt")]
        pet: Option<Length>,
        /// Truncation, in units of sigma
        #[serde(default = "default_cutoff")]
        cutoff: f64,
    },
    UncertaintyGaussian {
        #[serde(deserialize_with = "deserialize_uom")]
        inflation: Angle,
        #[serde(default = "default_cutoff")]
        cutoff: f64,
    },
    ResponseMatrix {
        transversal: PathBuf,
        longitudinal: Option<PathBuf>,
        #[serde(default = "default_matrix_smoothing")]
        smoothing: usize,
    },
    ConeShapes {
        path: PathBuf,
        #[serde(default = "default_cone_smoothing")]
        smoothing: usize,
    },
}

fn default_cutoff() -> f64 { response::gauss::DEFAULT_CUTOFF }
fn default_matrix_smoothing() -> usize { 1 }
fn default_cone_smoothing() -> usize { ConeShapes::DEFAULT_SMOOTHING }

impl Response {

    /// Build the response model; tables are loaded from disk here, so that
    /// unreadable ones abort the run before any event is processed.
    pub fn from_config(config: &ResponseConfig) -> Result<Self> {
        Ok(match config {
            ResponseConfig::FixedGaussian { transversal, longitudinal, pair, pet, cutoff } => {
                let model = FixedGaussian::new(*transversal, *longitudinal, *pair, ratio(*cutoff))?;
                let model = match pet {
                    Some(sigma) => model.with_pet(*sigma)?,
                    None        => model,
                };
                model.into()
            }
            ResponseConfig::UncertaintyGaussian { inflation, cutoff } =>
                UncertaintyGaussian::new(*inflation, ratio(*cutoff))?.into(),
            ResponseConfig::ResponseMatrix { transversal, longitudinal, smoothing } =>
                ResponseMatrix::load(transversal, longitudinal.as_deref(), *smoothing)?.into(),
            ResponseConfig::ConeShapes { path, smoothing } =>
                ConeShapes::load(path, *smoothing)?.into(),
        })
    }
}

// ----- Queue -----------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct QueueConfig {
    pub low_watermark: usize,
    pub max_low_watermark: usize,
    pub batch_size: usize,
    #[serde(deserialize_with = "deserialize_uom")]
    pub reader_sleep: Time,
    #[serde(deserialize_with = "deserialize_uom")]
    pub max_backoff: Time,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let QueueSettings { low_watermark, max_low_watermark, batch_size, reader_sleep, max_backoff } = QueueSettings::default();
        let ms = |d: Duration| units::ms(d.as_secs_f64() * 1e3);
        Self { low_watermark, max_low_watermark, batch_size, reader_sleep: ms(reader_sleep), max_backoff: ms(max_backoff) }
    }
}

impl From<&QueueConfig> for QueueSettings {
    fn from(c: &QueueConfig) -> Self {
        let duration = |t: Time| Duration::from_nanos((ms_(t).max(0.0) * 1e6).round() as u64);
        Self {
            low_watermark: c.low_watermark,
            max_low_watermark: c.max_low_watermark,
            batch_size: c.batch_size,
            reader_sleep: duration(c.reader_sleep),
            max_backoff: duration(c.max_backoff),
        }
    }
}

pub fn read_config_file(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read `{}`: {e}", path.display())))?;
    Ok(toml::from_str(&text)?)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseModel;
    use crate::event::ComptonEvent;
    use float_eq::assert_float_eq;
    use units::{cm, kev, mm, ms};
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    // ----- Test the example on-disk config file --------------------------------------
    #[test]
    fn test_config_file() {
        let config = read_config_file(Path::new("comptonrec-config.toml")).unwrap();
        assert_eq!(config.grid.kind, GridType::Spherical);
        assert_eq!(config.grid.phi.bins, 360);
        assert_eq!(config.grid.theta.max, deg(180.0));
        assert!(matches!(config.response, ResponseConfig::FixedGaussian { cutoff, .. } if cutoff == 2.5));
        assert_eq!(config.queue.batch_size, 10);

        let mut grid = Grid::from_config(&config.grid).unwrap();
        grid.prepare_backprojection();
        assert_eq!(grid.n_bins(), 360 * 180);
        Response::from_config(&config.response).unwrap();
    }

    // ----- Some helpers to make the tests more concise ---------------------------------
    fn parse<'d, D: Deserialize<'d>>(input: &'d str) -> D {
        toml::from_str(input).unwrap()
    }
    fn parse_carefully<'d, D: Deserialize<'d>>(input: &'d str) -> std::result::Result<D, toml::de::Error> {
        toml::from_str(input)
    }

    macro_rules! check {
        ($type:ident($text:expr).$field:ident = $expected:expr) => {
            let config: $type = parse::<$type>($text);
            println!("DESERIALIZED: {config:?}");
            assert_eq!(config.$field, $expected);
        };
        ($type:ident($text:expr) fields: $($field:ident = $expected:expr);+$(;)?) => {
            let config: $type = parse::<$type>($text);
            println!("DESERIALIZED: {config:?}");
            $(assert_eq!(config.$field, $expected);)*
        }
    }

    const SKY: &str = r#"
        type  = "spherical"
        phi   = { min = "-180 degrees", max = "180 degrees", bins = 80 }
        theta = { min =    "0 degrees", max = "180 degrees", bins = 40 }
    "#;

    // ----- Grid ------------------------------------------------------------------------
    #[test]
    fn grid_defaults() {
        check!{GridConfig(SKY) fields:
               kind               = GridType::Spherical;
               radius             = None;
               x_axis             = None;
               translation        = None;
               off_axis_cutoff    = Some(deg(60.0));
               distance_weighting = true;
        }
    }

    #[test]
    fn near_field_grid() {
        let text = r#"
            type  = "near-field"
            phi   = { min = "-180 degrees", max = "180 degrees", bins = 36 }
            theta = { min =    "0 degrees", max = "180 degrees", bins = 18 }
            radius = { min = "0 cm", max = "50 cm", bins = 10 }
            z_axis = [1.0, 0.0, 0.0]
            x_axis = [0.0, 1.0, 0.0]
            translation = ["0 cm", "0 cm", "5 mm"]
            off_axis_cutoff = "no"
            distance_weighting = false
        "#;
        let config: GridConfig = parse(text);
        assert_eq!(config.translation, Some((cm(0.0), cm(0.0), mm(5.0))));
        assert_eq!(config.near_field_tuning(), NearFieldTuning { off_axis_cutoff: None, distance_weighting: false });

        let grid = Grid::from_config(&config).unwrap();
        assert_eq!(grid.kind(), GridKind::NearFieldSpherical);
        assert_eq!(grid.dims(), [36, 18, 10]);
        assert_float_eq!(grid.frame().translation.z, 0.5, abs <= 1e-12);
    }

    #[test]
    fn near_field_grid_needs_radius() {
        let config: GridConfig = parse(&SKY.replace("spherical", "near-field"));
        assert!(matches!(Grid::from_config(&config), Err(Error::InvalidDimension { axis: "radius", .. })));
    }

    #[test]
    fn zero_bins_are_fatal() {
        let config: GridConfig = parse(&SKY.replace("bins = 40", "bins = 0"));
        assert!(matches!(Grid::from_config(&config), Err(Error::InvalidDimension { axis: "theta", .. })));
    }

    #[test]
    fn parallel_rotation_axes_are_fatal() {
        let text = format!("{SKY}\nx_axis = [0.0, 0.0, 2.0]\nz_axis = [0.0, 0.0, 1.0]");
        let config: GridConfig = parse(&text);
        assert!(matches!(Grid::from_config(&config), Err(Error::InvalidDimension { axis: "rotation", .. })));
    }

    // ----- Response --------------------------------------------------------------------
    #[test]
    fn fixed_gaussian_response() {
        let config: ResponseConfig = parse(r#"
            type = "fixed-gaussian"
            transversal  = "2 degrees"
            longitudinal = "10 degrees"
            pair         = "4 degrees"
        "#);
        assert_eq!(config, ResponseConfig::FixedGaussian {
            transversal: deg(2.0), longitudinal: deg(10.0), pair: deg(4.0), pet: None, cutoff: 2.5,
        });
        let mut model = Response::from_config(&config).unwrap();
        let event = ComptonEvent::from_cone(deg(30.0), Vector::z(), Vector::zeros(), kev(511.0)).unwrap();
        assert!(model.analyze_event(&event.into()));
    }

    #[test]
    fn uncertainty_gaussian_response() {
        let config: ResponseConfig = parse(r#"
            type = "uncertainty-gaussian"
            inflation = "0.5 degrees"
            cutoff = 3.0
        "#);
        assert_eq!(config, ResponseConfig::UncertaintyGaussian { inflation: deg(0.5), cutoff: 3.0 });
        assert!(matches!(Response::from_config(&config), Ok(Response::UncertaintyGaussian(_))));
    }

    #[test]
    fn missing_table_is_fatal() {
        let config: ResponseConfig = parse(r#"
            type = "response-matrix"
            transversal = "/nonexistent/transversal.rsp"
        "#);
        assert!(matches!(config, ResponseConfig::ResponseMatrix { smoothing: 1, longitudinal: None, .. }));
        assert!(matches!(Response::from_config(&config), Err(Error::ModelUnavailable { .. })));

        let config: ResponseConfig = parse(r#"
            type = "cone-shapes"
            path = "/nonexistent/cones.rsp"
        "#);
        assert!(matches!(Response::from_config(&config), Err(Error::ModelUnavailable { .. })));
    }

    #[test]
    fn unknown_response_type() {
        let result = parse_carefully::<ResponseConfig>(r#"type = "lorentzian""#);
        assert!(result.is_err());
    }

    // ----- Queue -----------------------------------------------------------------------
    #[test]
    fn queue_defaults_and_overrides() {
        check!{QueueConfig("") fields:
               low_watermark     = 100;
               max_low_watermark = 10_000;
               batch_size        = 10;
        }
        let c: QueueConfig = parse(r#"
            low_watermark = 50
            reader_sleep  = "2 ms"
        "#);
        assert_eq!(c.low_watermark, 50);
        assert_eq!(c.reader_sleep, ms(2.0));
        let settings = QueueSettings::from(&c);
        assert_eq!(settings.reader_sleep, Duration::from_millis(2));
        assert_eq!(settings.max_backoff, Duration::from_millis(50));
    }

    // ----- Make sure that unknown fields are not accepted -----------------------------
    #[test]
    #[should_panic]
    fn config_reject_unknown_field() {
        parse::<Config>("unknown_field = 666");
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        assert!(matches!(read_config_file(Path::new("/nonexistent/config.toml")), Err(Error::Config(_))));
    }

    #[test]
    fn uom_parse() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let a: Angle = "2 degrees".parse()?;
        assert_eq!(a, deg(2.0));
        let l: Length = "5 mm".parse()?;
        assert_eq!(l, mm(5.0));
        Ok(())
    }
}
