use std::io::Read;
use std::os::unix::io::AsRawFd;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use image::RgbImage;
use log::{debug, info, warn};

use crate::color::Rgb;
use crate::config::ScreenSampling;

/// Hard ceiling on one `grim` invocation; a hung capture is killed and the
/// sample skipped.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(1);
/// Fraction of each screen dimension covered by the sampled center region.
const REGION_FRACTION: f64 = 0.10;

/// Periodically samples the center of the screen and reports its mean color,
/// throttled so near-static content does not cause recolor flicker. The host
/// owns the timer; this owns the enable state and the throttle.
pub struct ScreenSampler {
    enabled: bool,
    update_interval: Duration,
    throttle_threshold: f64,
    last_reported: Option<Rgb>,
}

impl ScreenSampler {
    pub fn new(config: &ScreenSampling) -> Self {
        Self {
            enabled: config.enabled,
            update_interval: Duration::from_secs_f64(config.update_interval.max(0.05)),
            throttle_threshold: config.throttle_threshold,
            last_reported: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Flip sampling on or off, returning the new state.
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        info!(
            "screen sampling {}",
            if self.enabled { "enabled" } else { "disabled" }
        );
        self.enabled
    }

    /// Capture one sample; `None` means suppressed by the throttle or a
    /// failed capture (logged, never fatal).
    pub fn sample(&mut self, screen_width: u32, screen_height: u32) -> Option<Rgb> {
        if !self.enabled {
            return None;
        }

        let geometry = sample_geometry(screen_width, screen_height);
        let mean = match capture_mean(&geometry) {
            Ok(mean) => mean,
            Err(e) => {
                warn!("screen sample skipped: {e:#}");
                return None;
            }
        };

        self.observe(mean)
    }

    /// The throttle: report a mean only when it has moved further than the
    /// threshold (Euclidean RGB distance) from the last *reported* mean.
    pub fn observe(&mut self, mean: Rgb) -> Option<Rgb> {
        match self.last_reported {
            Some(last) if mean.distance(last) <= self.throttle_threshold => {
                debug!("sample {mean} within throttle threshold, suppressed");
                None
            }
            _ => {
                self.last_reported = Some(mean);
                Some(mean)
            }
        }
    }
}

/// `grim -g` geometry for the centered region, `"x,y WxH"`.
pub fn sample_geometry(screen_width: u32, screen_height: u32) -> String {
    let w = ((screen_width as f64 * REGION_FRACTION) as u32).max(1);
    let h = ((screen_height as f64 * REGION_FRACTION) as u32).max(1);
    let x = screen_width / 2 - w / 2;
    let y = screen_height / 2 - h / 2;
    format!("{x},{y} {w}x{h}")
}

/// Arithmetic mean over every pixel's RGB channels.
pub fn mean_color(image: &RgbImage) -> Option<Rgb> {
    let pixels = (image.width() as u64) * (image.height() as u64);
    if pixels == 0 {
        return None;
    }

    let mut sums = [0u64; 3];
    for pixel in image.pixels() {
        sums[0] += pixel.0[0] as u64;
        sums[1] += pixel.0[1] as u64;
        sums[2] += pixel.0[2] as u64;
    }

    Some(Rgb::new(
        (sums[0] / pixels) as u8,
        (sums[1] / pixels) as u8,
        (sums[2] / pixels) as u8,
    ))
}

fn capture_mean(geometry: &str) -> Result<Rgb> {
    let png = capture_png(geometry)?;
    let image = image::load_from_memory(&png)
        .context("decoding capture")?
        .to_rgb8();
    mean_color(&image).context("capture was empty")
}

/// Run `grim` for the region, reading its stdout with a poll loop so a hung
/// compositor or a stopped grim cannot block the event loop past the
/// timeout.
fn capture_png(geometry: &str) -> Result<Vec<u8>> {
    let mut child = Command::new("grim")
        .args(["-g", geometry, "-t", "png", "-"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .context("spawning grim")?;

    let mut stdout = child.stdout.take().context("grim stdout missing")?;
    set_nonblocking(stdout.as_raw_fd())?;

    let deadline = Instant::now() + CAPTURE_TIMEOUT;
    let mut png = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        match stdout.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => png.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    bail!("grim timed out after {CAPTURE_TIMEOUT:?}");
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e).context("reading grim output");
            }
        }
    }

    let status = child.wait().context("waiting for grim")?;
    if !status.success() {
        bail!("grim exited with {status}");
    }
    Ok(png)
}

fn set_nonblocking(fd: i32) -> Result<()> {
    // SAFETY: plain fcntl flag twiddling on a fd we own.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        bail!("fcntl(F_GETFL) failed");
    }
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if ret < 0 {
        bail!("fcntl(F_SETFL) failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(threshold: f64) -> ScreenSampler {
        ScreenSampler::new(&ScreenSampling {
            enabled: true,
            update_interval: 0.5,
            throttle_threshold: threshold,
        })
    }

    #[test]
    fn first_sample_always_reports() {
        let mut s = sampler(15.0);
        assert_eq!(s.observe(Rgb::new(10, 10, 10)), Some(Rgb::new(10, 10, 10)));
    }

    #[test]
    fn throttle_boundary() {
        let mut s = sampler(15.0);
        s.observe(Rgb::new(10, 10, 10));

        // Distance 10: suppressed.
        assert_eq!(s.observe(Rgb::new(10, 10, 20)), None);
        // Distance 16 from the last *reported* color (not the suppressed
        // one): fires.
        assert_eq!(
            s.observe(Rgb::new(10, 10, 26)),
            Some(Rgb::new(10, 10, 26))
        );
        // Exactly at the threshold: suppressed (strict >).
        assert_eq!(s.observe(Rgb::new(10, 25, 26)), None);
    }

    #[test]
    fn suppressed_samples_do_not_move_the_baseline() {
        let mut s = sampler(15.0);
        s.observe(Rgb::new(0, 0, 0));
        // A slow drift below the threshold never fires, no matter how far
        // the *suppressed* values creep from each other.
        assert_eq!(s.observe(Rgb::new(0, 0, 10)), None);
        assert_eq!(s.observe(Rgb::new(0, 0, 14)), None);
        // Crossing the threshold relative to the baseline fires.
        assert_eq!(s.observe(Rgb::new(0, 0, 16)), Some(Rgb::new(0, 0, 16)));
    }

    #[test]
    fn toggle_flips_and_reports() {
        let mut s = sampler(15.0);
        assert!(s.enabled());
        assert!(!s.toggle());
        assert!(!s.enabled());
        assert!(s.toggle());
    }

    #[test]
    fn disabled_sampler_never_samples() {
        let mut s = sampler(15.0);
        s.toggle();
        assert_eq!(s.sample(1920, 1080), None);
    }

    #[test]
    fn geometry_is_centered_tenth() {
        assert_eq!(sample_geometry(1920, 1080), "864,486 192x108");
        assert_eq!(sample_geometry(2560, 1440), "1152,648 256x144");
    }

    #[test]
    fn mean_of_uniform_image() {
        let img = RgbImage::from_pixel(4, 4, image::Rgb([10, 200, 30]));
        assert_eq!(mean_color(&img), Some(Rgb::new(10, 200, 30)));
    }

    #[test]
    fn mean_averages_channels_independently() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgb([0, 0, 100]));
        img.put_pixel(1, 0, image::Rgb([200, 50, 100]));
        assert_eq!(mean_color(&img), Some(Rgb::new(100, 25, 100)));
    }

    #[test]
    fn empty_image_has_no_mean() {
        let img = RgbImage::new(0, 0);
        assert_eq!(mean_color(&img), None);
    }
}
