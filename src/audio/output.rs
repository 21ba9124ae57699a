use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use log::{error, info};

use crate::audio::device::DeviceManager;
use crate::audio::driver::{MixerConfig, SoftwareDriver};
use crate::error::DriverError;

/// A running cpal output stream that plays the software mixer.
///
/// Dropping it stops audio output; the driver keeps working and can still
/// be rendered by hand.
pub struct OutputStream {
    _stream: Stream,
    sample_rate: u32,
    channels: u16,
}

impl OutputStream {
    /// Open the selected device (or the default) at its preferred config and
    /// return a mixer sized for it together with the stream feeding from it
    pub fn open(devices: &DeviceManager, max_voices: usize) -> Result<(Self, SoftwareDriver), DriverError> {
        let device = devices
            .current_device()
            .ok_or_else(|| DriverError::Device("No output device selected".to_string()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| DriverError::Device(format!("Failed to get default config: {}", e)))?;

        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let driver = SoftwareDriver::new(MixerConfig {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
            max_voices,
            max_playing: None,
        });

        let stream = match sample_format {
            SampleFormat::F32 => Self::build::<f32>(device, &config, driver.clone())?,
            SampleFormat::I16 => Self::build::<i16>(device, &config, driver.clone())?,
            SampleFormat::U16 => Self::build::<u16>(device, &config, driver.clone())?,
            other => {
                return Err(DriverError::Device(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };
        stream
            .play()
            .map_err(|e| DriverError::Device(format!("Failed to start output stream: {}", e)))?;

        info!(
            "Output stream open: {} Hz, {} channel(s), {:?}",
            config.sample_rate.0, config.channels, sample_format
        );
        Ok((
            Self {
                _stream: stream,
                sample_rate: config.sample_rate.0,
                channels: config.channels,
            },
            driver,
        ))
    }

    fn build<T>(device: &Device, config: &StreamConfig, driver: SoftwareDriver) -> Result<Stream, DriverError>
    where
        T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
    {
        let mut mix: Vec<f32> = Vec::new();
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    mix.resize(data.len(), 0.0);
                    driver.render(&mut mix);
                    for (out, sample) in data.iter_mut().zip(&mix) {
                        *out = cpal::Sample::from_sample(*sample);
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| DriverError::Device(format!("Failed to build output stream: {}", e)))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}
