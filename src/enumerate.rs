use crate::catalog::{self, Exercise};
use crate::config::CatalogConfig;
use crate::keymap::{self, Hand, KEYS};
use crate::step::{self, Step};

pub fn audio() -> anyhow::Result<()> {
    // Suppress ALSA/JACK noise on stderr during device enumeration
    let stderr_guard = suppress_stderr();

    use cpal::traits::{DeviceTrait, HostTrait};
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    let devices: Vec<_> = host
        .devices()?
        .filter_map(|device| {
            let name = device.name().ok()?;
            let config = device.default_output_config().ok()?;
            Some((name, config))
        })
        .collect();

    let _ = stderr_guard;

    println!("=== Audio Output Devices ===");
    if devices.is_empty() {
        println!("  (none found)");
        return Ok(());
    }
    for (name, config) in &devices {
        let is_default = default_name.as_deref() == Some(name.as_str());
        let marker = if is_default { " *" } else { "" };
        println!(
            "  {name}{marker}  ({ch}ch, {rate}Hz, {fmt})",
            ch = config.channels(),
            rate = config.sample_rate().0,
            fmt = format_sample_fmt(config.sample_format()),
        );
    }
    Ok(())
}

fn format_sample_fmt(fmt: cpal::SampleFormat) -> &'static str {
    match fmt {
        cpal::SampleFormat::I8 => "i8",
        cpal::SampleFormat::I16 => "i16",
        cpal::SampleFormat::I32 => "i32",
        cpal::SampleFormat::I64 => "i64",
        cpal::SampleFormat::U8 => "u8",
        cpal::SampleFormat::U16 => "u16",
        cpal::SampleFormat::U32 => "u32",
        cpal::SampleFormat::U64 => "u64",
        cpal::SampleFormat::F32 => "f32",
        cpal::SampleFormat::F64 => "f64",
        _ => "?",
    }
}

/// Temporarily redirect stderr to /dev/null to suppress ALSA/JACK library spam.
/// Returns a guard that restores stderr on drop. No-op on non-Unix platforms.
#[cfg(unix)]
fn suppress_stderr() -> Option<StderrGuard> {
    use std::os::unix::io::AsRawFd;
    let devnull = std::fs::File::open("/dev/null").ok()?;
    let stderr_fd = std::io::stderr().as_raw_fd();
    let saved = unsafe { libc::dup(stderr_fd) };
    if saved < 0 {
        return None;
    }
    unsafe { libc::dup2(devnull.as_raw_fd(), stderr_fd) };
    Some(StderrGuard { saved_fd: saved })
}

#[cfg(unix)]
struct StderrGuard {
    saved_fd: i32,
}

#[cfg(unix)]
impl Drop for StderrGuard {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        let stderr_fd = std::io::stderr().as_raw_fd();
        unsafe {
            libc::dup2(self.saved_fd, stderr_fd);
            libc::close(self.saved_fd);
        }
    }
}

#[cfg(not(unix))]
fn suppress_stderr() -> Option<()> {
    None
}

pub fn keys() -> anyhow::Result<()> {
    println!("=== Key Mapping ===");
    for k in &KEYS {
        println!(
            "  {label}  {note:<4} {solfege:<5} {freq:>7.2} Hz  {colour}  {hand}",
            label = k.label,
            note = k.note,
            solfege = k.solfege,
            freq = k.frequency,
            colour = if k.is_black { "black" } else { "white" },
            hand = match k.hand {
                Hand::Left => "left",
                Hand::Right => "right",
            },
        );
    }
    println!();
    print_chords("Major Chords", keymap::major_chord);
    println!();
    print_chords("Minor Chords", keymap::minor_chord);
    Ok(())
}

fn print_chords(title: &str, chord: fn(&str) -> Option<[&'static str; 3]>) {
    println!("=== {title} ===");
    for root in keymap::ROOTS {
        if let Some(keys) = chord(&root.to_string()) {
            println!("  {root}  {}", Step::parse(&step::encode(&keys)).label());
        }
    }
}

/// Fetches synchronously; only the TUI needs the background fetch.
pub fn exercises(config: &CatalogConfig) -> anyhow::Result<()> {
    let source = catalog::source_from(config);
    let exercises = catalog::load(source.as_deref());

    println!("=== Exercises ===");
    for ex in &exercises {
        print_exercise(ex);
    }
    Ok(())
}

fn print_exercise(ex: &Exercise) {
    println!("  [{}] {}", ex.difficulty.label(), ex.title);
    println!("          ID:    {}", ex.id);
    if let Some(desc) = ex.description.as_deref().filter(|d| !d.is_empty()) {
        println!("          About: {desc}");
    }
    let steps: Vec<String> = ex.steps().iter().map(Step::label).collect();
    println!("          Steps: {}", steps.len());
    for (i, label) in steps.iter().enumerate() {
        println!("            {:>2}. {label}", i + 1);
    }
    for problem in ex.unknown_keys() {
        println!("          Warning: {problem}");
    }
}
