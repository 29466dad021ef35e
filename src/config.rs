//! Run configuration: the immutable-per-batch record handed to the
//! propagation collaborator, loaded from a sectioned TOML file.

use std::fs;
use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::DispersionError;

/// Navigation filter applied during flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    None,
    Kf,
    Ekf,
}

/// Reentry maneuverability mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MnvrMode {
    None,
    Instant,
}

/// Reentry vehicle type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RvType {
    Ballistic,
    Maneuverable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    pub name: String,
    pub num_runs: usize,
    /// Integration step during the boost phase [s]
    pub time_step_boost: f64,
    /// Integration step during reentry [s]
    pub time_step_reentry: f64,
    /// Whether the propagator also persists per-step trajectory data
    #[serde(default)]
    pub traj_output: bool,
    /// Aimpoint in the Earth-centered Cartesian frame [m]
    pub x_aim: f64,
    pub y_aim: f64,
    pub z_aim: f64,
    pub launch_azimuth_deg: f64,
    pub launch_elevation_deg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightSection {
    pub grav_error: bool,
    pub atm_error: bool,
    pub gnss_nav: bool,
    pub ins_nav: bool,
    pub boost_guidance: bool,
    pub reentry_mnvr: MnvrMode,
    pub filter_type: FilterType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSection {
    pub rv_type: RvType,
}

/// One of the seven stochastic error sources the collaborator injects per
/// trial. The declaration order is the fixed sweep-group order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    Position,
    Velocity,
    Angle,
    AccScale,
    GyroBias,
    GyroNoise,
    GnssNoise,
}

impl ErrorSource {
    pub const ALL: [ErrorSource; 7] = [
        ErrorSource::Position,
        ErrorSource::Velocity,
        ErrorSource::Angle,
        ErrorSource::AccScale,
        ErrorSource::GyroBias,
        ErrorSource::GyroNoise,
        ErrorSource::GnssNoise,
    ];

    /// Column name used in the sensitivity table and the config schema.
    pub fn field_name(self) -> &'static str {
        match self {
            ErrorSource::Position => "initial_pos_error",
            ErrorSource::Velocity => "initial_vel_error",
            ErrorSource::Angle => "initial_angle_error",
            ErrorSource::AccScale => "acc_scale_stability",
            ErrorSource::GyroBias => "gyro_bias_stability",
            ErrorSource::GyroNoise => "gyro_noise",
            ErrorSource::GnssNoise => "gnss_noise",
        }
    }
}

/// The seven error-source magnitudes. All fields are standard deviations in
/// the units the propagator expects; zero disables a source entirely.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorParams {
    /// Initial position error [m]
    pub initial_pos_error: f64,
    /// Initial velocity error [m/s]
    pub initial_vel_error: f64,
    /// Initial attitude angle error [rad]
    pub initial_angle_error: f64,
    /// Accelerometer scale-factor instability [ppm]
    pub acc_scale_stability: f64,
    /// Gyro bias instability [rad/s]
    pub gyro_bias_stability: f64,
    /// Gyro noise [rad/s/sqrt(s)]
    pub gyro_noise: f64,
    /// GNSS measurement noise [m]
    pub gnss_noise: f64,
}

impl ErrorParams {
    pub fn zeroed() -> Self {
        Self::default()
    }

    pub fn magnitude(&self, source: ErrorSource) -> f64 {
        match source {
            ErrorSource::Position => self.initial_pos_error,
            ErrorSource::Velocity => self.initial_vel_error,
            ErrorSource::Angle => self.initial_angle_error,
            ErrorSource::AccScale => self.acc_scale_stability,
            ErrorSource::GyroBias => self.gyro_bias_stability,
            ErrorSource::GyroNoise => self.gyro_noise,
            ErrorSource::GnssNoise => self.gnss_noise,
        }
    }

    pub fn set_magnitude(&mut self, source: ErrorSource, value: f64) {
        match source {
            ErrorSource::Position => self.initial_pos_error = value,
            ErrorSource::Velocity => self.initial_vel_error = value,
            ErrorSource::Angle => self.initial_angle_error = value,
            ErrorSource::AccScale => self.acc_scale_stability = value,
            ErrorSource::GyroBias => self.gyro_bias_stability = value,
            ErrorSource::GyroNoise => self.gyro_noise = value,
            ErrorSource::GnssNoise => self.gnss_noise = value,
        }
    }

    /// One source set to `value`, the other six zero.
    pub fn isolated(source: ErrorSource, value: f64) -> Self {
        let mut params = Self::zeroed();
        params.set_magnitude(source, value);
        params
    }

    /// Every magnitude multiplied by `factor`.
    pub fn scaled_all(&self, factor: f64) -> Self {
        let mut params = *self;
        for source in ErrorSource::ALL {
            params.set_magnitude(source, self.magnitude(source) * factor);
        }
        params
    }

    /// Magnitudes in the fixed `ErrorSource::ALL` order.
    pub fn as_array(&self) -> [f64; 7] {
        [
            self.initial_pos_error,
            self.initial_vel_error,
            self.initial_angle_error,
            self.acc_scale_stability,
            self.gyro_bias_stability,
            self.gyro_noise,
            self.gnss_noise,
        ]
    }

    pub fn validate(&self) -> Result<(), DispersionError> {
        for source in ErrorSource::ALL {
            let value = self.magnitude(source);
            if !value.is_finite() || value < 0.0 {
                return Err(DispersionError::InvalidConfig(format!(
                    "{} must be finite and >= 0, got {value}",
                    source.field_name()
                )));
            }
        }
        Ok(())
    }
}

/// Full run configuration, one TOML section per struct field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub run: RunSection,
    pub flight: FlightSection,
    pub vehicle: VehicleSection,
    pub errorparams: ErrorParams,
}

impl RunConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, DispersionError> {
        let raw = fs::read_to_string(path)?;
        let config: RunConfig = toml::from_str(&raw).map_err(|err| {
            DispersionError::InvalidConfig(format!(
                "failed to parse {}: {err}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DispersionError> {
        if self.run.name.is_empty() {
            return Err(DispersionError::InvalidConfig(
                "run name must be non-empty".to_string(),
            ));
        }
        if self.run.num_runs == 0 {
            return Err(DispersionError::InvalidConfig(
                "num_runs must be greater than zero".to_string(),
            ));
        }
        for (label, step) in [
            ("time_step_boost", self.run.time_step_boost),
            ("time_step_reentry", self.run.time_step_reentry),
        ] {
            if !step.is_finite() || step <= 0.0 {
                return Err(DispersionError::InvalidConfig(format!(
                    "{label} must be finite and > 0, got {step}"
                )));
            }
        }
        let aim = self.aimpoint();
        if !aim.iter().all(|v| v.is_finite()) || aim.norm() == 0.0 {
            return Err(DispersionError::InvalidConfig(
                "aimpoint must be finite and non-zero (tangent plane undefined at the origin)"
                    .to_string(),
            ));
        }
        self.errorparams.validate()
    }

    pub fn aimpoint(&self) -> Vector3<f64> {
        Vector3::new(self.run.x_aim, self.run.y_aim, self.run.z_aim)
    }

    /// Fresh configuration with the error magnitudes replaced. Sweep steps go
    /// through this instead of mutating a shared config in place, so a step
    /// can never leak magnitudes into the next one.
    pub fn with_error_params(&self, errorparams: ErrorParams) -> Self {
        let mut config = self.clone();
        config.errorparams = errorparams;
        config
    }
}
