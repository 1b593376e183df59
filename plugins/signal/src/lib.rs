//! Signal conditioning components: raw ADC to voltage conversion and
//! decimation.
//!
//! Built as a loadable module (`libsp_signal.so` and friends). Hosts that link
//! it statically can call [`register`] directly instead.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use pipeline_registry::{
    export_components, Component, Registry, RegistryError, RegistryResult, SharedComponent,
};

/// Reads JSON options from `config`, or the defaults without one.
fn read_options<T>(config: Option<&Path>) -> RegistryResult<T>
where
    T: DeserializeOwned + Default,
{
    match config {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        }
        None => Ok(T::default()),
    }
}

/// Options of the `ToVoltage` component
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ToVoltageOptions {
    /// Reference voltage for conversion
    pub vref: f32,
    /// ADC resolution (bits)
    pub adc_bits: u8,
}

impl Default for ToVoltageOptions {
    fn default() -> Self {
        Self {
            vref: 4.5,
            adc_bits: 24,
        }
    }
}

/// Converts raw signed ADC counts to volts.
pub struct ToVoltage {
    options: ToVoltageOptions,
}

impl ToVoltage {
    pub fn new(options: ToVoltageOptions) -> RegistryResult<Self> {
        if !(2..=32).contains(&options.adc_bits) {
            return Err(RegistryError::Config(format!(
                "adc_bits must be between 2 and 32, got {}",
                options.adc_bits
            )));
        }
        if options.vref <= 0.0 {
            return Err(RegistryError::Config(format!(
                "vref must be positive, got {}",
                options.vref
            )));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &ToVoltageOptions {
        &self.options
    }

    /// Convert raw ADC values to voltages
    pub fn convert(&self, raw: &[i32]) -> Vec<f32> {
        let max_value = ((1i64 << (self.options.adc_bits - 1)) - 1) as f32; // For signed values
        raw.iter()
            .map(|&value| value as f32 / max_value * self.options.vref)
            .collect()
    }
}

impl Component for ToVoltage {
    fn kind(&self) -> &str {
        "ToVoltage"
    }

    fn info(&self) -> &str {
        "Converts raw ADC values to voltage values"
    }
}

/// Options of the `DownSample` component
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DownSampleOptions {
    /// Keep one sample out of `factor`
    pub factor: usize,
    /// Emit the mean of each block instead of its first sample
    pub mean: bool,
}

impl Default for DownSampleOptions {
    fn default() -> Self {
        Self {
            factor: 2,
            mean: false,
        }
    }
}

/// Reduces the sample rate of a single channel by an integer factor.
pub struct DownSample {
    options: DownSampleOptions,
}

impl DownSample {
    pub fn new(options: DownSampleOptions) -> RegistryResult<Self> {
        if options.factor == 0 {
            return Err(RegistryError::Config(
                "down-sampling factor must be at least 1".to_string(),
            ));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &DownSampleOptions {
        &self.options
    }

    /// Decimates `samples`. A trailing partial block still yields a sample.
    pub fn process(&self, samples: &[f32]) -> Vec<f32> {
        samples
            .chunks(self.options.factor)
            .map(|block| {
                if self.options.mean {
                    block.iter().sum::<f32>() / block.len() as f32
                } else {
                    block[0]
                }
            })
            .collect()
    }
}

impl Component for DownSample {
    fn kind(&self) -> &str {
        "DownSample"
    }

    fn info(&self) -> &str {
        "Keeps every n-th sample of a channel"
    }
}

fn create_to_voltage(config: Option<&Path>) -> RegistryResult<SharedComponent> {
    let options: ToVoltageOptions = read_options(config)?;
    debug!("to_voltage: vref={}V, adc_bits={}", options.vref, options.adc_bits);
    Ok(Arc::new(ToVoltage::new(options)?))
}

fn create_down_sample(config: Option<&Path>) -> RegistryResult<SharedComponent> {
    let options: DownSampleOptions = read_options(config)?;
    debug!("down_sample: factor={}, mean={}", options.factor, options.mean);
    Ok(Arc::new(DownSample::new(options)?))
}

/// Registers every component of this module with `registry`.
pub fn register(registry: &mut Registry) -> bool {
    let results = [
        registry.register("ToVoltage", create_to_voltage),
        registry.register("DownSample", create_down_sample),
    ];
    results.iter().all(Result::is_ok)
}

fn unregister() {
    info!("signal components unloaded");
}

export_components!(register, unregister);

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_registry::{
        BuildMode, ModuleNaming, Platform, RegistryConfig, StaticLoader, StaticModule,
    };

    #[test]
    fn test_to_voltage_conversion() {
        let to_voltage = ToVoltage::new(ToVoltageOptions {
            vref: 2.0,
            adc_bits: 8,
        })
        .unwrap();

        assert_eq!(to_voltage.convert(&[0, 127, -127]), vec![0.0, 2.0, -2.0]);
        assert!(ToVoltage::new(ToVoltageOptions { vref: 1.0, adc_bits: 1 }).is_err());
        assert!(ToVoltage::new(ToVoltageOptions { vref: 0.0, adc_bits: 24 }).is_err());
    }

    #[test]
    fn test_down_sample() {
        let keep = DownSample::new(DownSampleOptions { factor: 2, mean: false }).unwrap();
        assert_eq!(keep.process(&[1.0, 2.0, 3.0, 4.0, 5.0]), vec![1.0, 3.0, 5.0]);

        let mean = DownSample::new(DownSampleOptions { factor: 2, mean: true }).unwrap();
        assert_eq!(mean.process(&[1.0, 3.0, 5.0, 7.0, 9.0]), vec![2.0, 6.0, 9.0]);

        assert!(mean.process(&[]).is_empty());
        assert!(DownSample::new(DownSampleOptions { factor: 0, mean: false }).is_err());
    }

    #[test]
    fn test_register_and_create_from_config() {
        let mut registry = Registry::default();
        assert!(register(&mut registry));
        assert_eq!(registry.component_names(), vec!["DownSample", "ToVoltage"]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("down_sample.json");
        std::fs::write(&path, r#"{ "factor": 4 }"#).unwrap();

        let handle = registry.create("DownSample:ds", Some(path.as_path()), true, None).unwrap();
        let down_sample = handle.downcast_ref::<DownSample>().unwrap();
        assert_eq!(down_sample.options(), &DownSampleOptions { factor: 4, mean: false });
        assert_eq!(registry.instance_ids(None), vec!["ds"]);

        let voltage = registry.create("ToVoltage", None, true, None).unwrap();
        assert_eq!(
            voltage.downcast_ref::<ToVoltage>().unwrap().options(),
            &ToVoltageOptions::default()
        );

        // a second registration pass reports the clash
        assert!(!register(&mut registry));
    }

    #[test]
    fn test_bad_config_is_rejected() {
        let mut registry = Registry::default();
        register(&mut registry);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "factor": 0 }"#).unwrap();
        assert!(matches!(
            registry.create("DownSample", Some(path.as_path()), true, None),
            Err(RegistryError::Config(_))
        ));

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            registry.create("ToVoltage", Some(missing.as_path()), true, None),
            Err(RegistryError::Io(_))
        ));
        assert!(registry.instance_ids(None).is_empty());
    }

    #[test]
    fn test_exported_entry_points() {
        let module = StaticModule::new(sp_register_components)
            .with_unregister(sp_unregister_components);
        let loader = StaticLoader::new().with_module("libsp_signal.so", module);
        let mut registry = Registry::with_loader(RegistryConfig::default(), loader);
        registry.set_naming(ModuleNaming {
            prefix: "sp_".to_string(),
            debug_marker: None,
            build: BuildMode::Release,
            platform: Platform::Linux,
        });

        assert!(registry.load("signal").unwrap());
        assert!(registry.create("ToVoltage", None, true, None).is_ok());
        registry.clear_all();
        assert!(registry.component_names().is_empty());
    }
}
