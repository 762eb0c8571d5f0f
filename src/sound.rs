use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SizedSample, Stream, StreamConfig};
use log::warn;

const TONE_HZ: f32 = 440.0;

/// The beeper. One persistent output stream, built paused; `set_tone`
/// follows the sound timer's gate from the driver loop.
pub struct Sound {
    stream: Stream,
    playing: bool,
}

impl Sound {
    /// Returns `None` when no usable output device exists; the machine then
    /// runs silent.
    pub fn new() -> Option<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        let supported = match device.default_output_config() {
            Ok(config) => config,
            Err(err) => {
                warn!("querying audio output config failed: {err}");
                return None;
            }
        };
        let format = supported.sample_format();
        let config = supported.into();
        let stream = match format {
            cpal::SampleFormat::I16 => Self::build::<i16>(&device, &config),
            cpal::SampleFormat::U16 => Self::build::<u16>(&device, &config),
            cpal::SampleFormat::F32 => Self::build::<f32>(&device, &config),
            other => {
                warn!("unsupported audio sample format {other}");
                return None;
            }
        }?;
        if let Err(err) = stream.pause() {
            warn!("pausing audio stream failed: {err}");
        }
        Some(Self {
            stream,
            playing: false,
        })
    }

    fn build<T>(device: &Device, config: &StreamConfig) -> Option<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let sample_rate = config.sample_rate.0 as f32;
        let channels = config.channels as usize;

        let mut sample_clock = 0f32;
        let mut next_value = move || {
            sample_clock = (sample_clock + 1.0) % sample_rate;
            (sample_clock * TONE_HZ * 2.0 * std::f32::consts::PI / sample_rate).sin()
        };

        let err_fn = |err| warn!("audio stream error: {err}");

        match device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                Self::write_data(data, channels, &mut next_value)
            },
            err_fn,
            None,
        ) {
            Ok(stream) => Some(stream),
            Err(err) => {
                warn!("building audio stream failed: {err}");
                None
            }
        }
    }

    /// Starts or stops the tone. Only gate transitions touch the stream.
    pub fn set_tone(&mut self, on: bool) {
        if on == self.playing {
            return;
        }
        let switched = if on {
            self.stream.play().map_err(|err| err.to_string())
        } else {
            self.stream.pause().map_err(|err| err.to_string())
        };
        match switched {
            Ok(()) => self.playing = on,
            Err(err) => warn!("switching audio stream failed: {err}"),
        }
    }

    fn write_data<T>(output: &mut [T], channels: usize, next_sample: &mut dyn FnMut() -> f32)
    where
        T: Sample + FromSample<f32>,
    {
        for frame in output.chunks_mut(channels) {
            let value: T = T::from_sample(next_sample());
            for sample in frame.iter_mut() {
                *sample = value;
            }
        }
    }
}
