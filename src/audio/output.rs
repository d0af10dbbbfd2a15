// Audio output using cpal
// Feeds the default output device from a ring buffer

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig, SupportedStreamConfig};
use ringbuf::{HeapRb, traits::{Consumer, Observer, Producer, Split}};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

const BUFFER_MS: usize = 250;

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

/// One open output stream. Not `Send`: create and use it on a single thread.
pub struct AudioOutput {
    _stream: Stream,
    producer: RingProducer,
    sample_rate: u32,
    channels: u16,
    clear_flag: Arc<AtomicBool>,
}

impl AudioOutput {
    /// Open the default device, preferring the track's own rate and channel count.
    pub fn open(sample_rate: u32, channels: u16, volume: f32) -> Result<Self, String> {
        let host = cpal::default_host();

        let device = host.default_output_device()
            .ok_or("No output device available")?;

        let config = Self::pick_config(&device, sample_rate, channels)?;
        let output_rate = config.sample_rate().0;
        let output_channels = config.channels();
        if output_rate != sample_rate {
            warn!(track_rate = sample_rate, output_rate, "Output device does not support the track sample rate");
        }

        let capacity = output_rate as usize * output_channels as usize * BUFFER_MS / 1000;
        let (producer, consumer) = HeapRb::<f32>::new(capacity.max(1024)).split();

        let volume = volume.clamp(0.0, 1.0);
        let clear_flag = Arc::new(AtomicBool::new(false));

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.config(), consumer, volume, clear_flag.clone())?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.config(), consumer, volume, clear_flag.clone())?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.config(), consumer, volume, clear_flag.clone())?
            }
            format => return Err(format!("Unsupported sample format: {:?}", format)),
        };

        stream.play().map_err(|e| format!("Failed to start stream: {}", e))?;

        Ok(Self {
            _stream: stream,
            producer,
            sample_rate: output_rate,
            channels: output_channels,
            clear_flag,
        })
    }

    fn pick_config(device: &cpal::Device, sample_rate: u32, channels: u16) -> Result<SupportedStreamConfig, String> {
        let wanted = SampleRate(sample_rate);
        let matching = device.supported_output_configs()
            .ok()
            .and_then(|mut configs| {
                configs.find(|c| {
                    c.channels() == channels
                        && c.min_sample_rate() <= wanted
                        && wanted <= c.max_sample_rate()
                })
            });

        match matching {
            Some(range) => Ok(range.with_sample_rate(wanted)),
            None => device.default_output_config()
                .map_err(|e| format!("Failed to get default output config: {}", e)),
        }
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        mut consumer: RingConsumer,
        volume: f32,
        clear_flag: Arc<AtomicBool>,
    ) -> Result<Stream, String> {
        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if clear_flag.swap(false, Ordering::SeqCst) {
                    consumer.clear();
                }

                for sample in data.iter_mut() {
                    let value = consumer.try_pop().unwrap_or(0.0) * volume;
                    *sample = T::from_sample(value);
                }
            },
            move |err| {
                error!(error = %err, "Audio output error");
            },
            None,
        ).map_err(|e| format!("Failed to build output stream: {}", e))?;

        Ok(stream)
    }

    /// Push samples, waiting for room. Gives up after `timeout` and returns
    /// how many samples were accepted.
    pub fn write_blocking(&mut self, samples: &[f32], timeout: Duration) -> usize {
        let mut written = 0;
        let mut waited = Duration::ZERO;
        let step = Duration::from_millis(2);

        while written < samples.len() {
            let pushed = self.producer.push_slice(&samples[written..]);
            written += pushed;
            if pushed == 0 {
                if waited >= timeout {
                    break;
                }
                std::thread::sleep(step);
                waited += step;
            }
        }

        written
    }

    /// Samples queued but not yet played
    pub fn queued(&self) -> usize {
        self.producer.occupied_len()
    }

    /// Drop everything queued (seek, pause)
    pub fn clear(&self) {
        self.clear_flag.store(true, Ordering::SeqCst);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}
