//! x11present - Main entry point
//!
//! Opens a window on an X server and shows a test pattern through the
//! Present extension or MIT-SHM.

use std::env;
use std::process;

use x11present::protocol::ByteOrder;
use x11present::VERSION;

#[cfg(unix)]
use x11present::{CapabilitySource, LoopExit, PresentMode, Session, SessionConfig};

fn print_usage() {
    println!("x11present v{}", VERSION);
    println!("A minimal X11 client presenting a shared pixel buffer");
    println!();
    println!("Usage: x11present [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -display <name>       Display to connect to (default: $DISPLAY or :0)");
    println!("  -size <W>x<H>         Image and window size (default: 1024x1024)");
    println!("  -shm                  Use MIT-SHM PutImage instead of Present/DRI3");
    println!("  -lsb                  Use little-endian byte order on the wire");
    println!("  -assume-capabilities  Skip InternAtom/QueryExtension, use known Xorg values");
    println!("  -h, --help            Show this help message");
    println!();
    println!("Examples:");
    println!("  x11present -display :1");
    println!("  x11present -shm -size 640x480");
    println!();
}

#[derive(Debug)]
struct Config {
    display: Option<String>,
    width: u16,
    height: u16,
    shm: bool,
    byte_order: ByteOrder,
    assume_capabilities: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            display: None,
            width: 1024,
            height: 1024,
            shm: false,
            byte_order: ByteOrder::MSBFirst,
            assume_capabilities: false,
        }
    }
}

fn parse_size(value: &str) -> Result<(u16, u16), String> {
    let invalid = || format!("Invalid size: {} (expected WxH)", value);
    let (w, h) = value.split_once('x').ok_or_else(invalid)?;
    let width: u16 = w.parse().map_err(|_| invalid())?;
    let height: u16 = h.parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

fn parse_args() -> Result<Config, String> {
    let mut config = Config::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-display" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for -display".to_string());
                }
                config.display = Some(args[i].clone());
            }
            "-size" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for -size".to_string());
                }
                (config.width, config.height) = parse_size(&args[i])?;
            }
            "-shm" => {
                config.shm = true;
            }
            "-lsb" => {
                config.byte_order = ByteOrder::LSBFirst;
            }
            "-assume-capabilities" => {
                config.assume_capabilities = true;
            }
            arg => {
                return Err(format!("Unknown option: {}", arg));
            }
        }
        i += 1;
    }

    Ok(config)
}

/// White image with a black square in the middle
fn test_pattern(pixels: &mut [u8], stride: usize, width: u16, height: u16) {
    pixels.fill(0xff);

    let (w, h) = (width as usize, height as usize);
    let side = w.min(h) / 4;
    let (x0, y0) = ((w - side) / 2, (h - side) / 2);
    for row in pixels.chunks_mut(stride).skip(y0).take(side) {
        for px in row[x0 * 4..(x0 + side) * 4].chunks_mut(4) {
            px[..3].fill(0);
        }
    }
}

#[cfg(unix)]
fn run(config: Config) -> x11present::ClientResult<()> {
    let mut session_config = SessionConfig {
        width: config.width,
        height: config.height,
        byte_order: config.byte_order,
        ..SessionConfig::default()
    };
    if let Some(display) = config.display {
        session_config.display = display;
    }
    if config.shm {
        session_config.mode = PresentMode::Shm;
    }
    if config.assume_capabilities {
        session_config.capabilities = CapabilitySource::Assumed;
    }

    let mut session = Session::connect(&session_config)?;
    let (width, height) = (config.width, config.height);
    session.draw(|pixels, stride| test_pattern(pixels, stride, width, height))?;
    session.present()?;

    match session.run()? {
        LoopExit::CloseRequested => log::info!("Window closed"),
        LoopExit::WindowDestroyed => log::info!("Window destroyed"),
        LoopExit::ServerClosed => log::warn!("Server went away"),
    }
    session.shutdown()
}

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    log::info!("x11present v{}", VERSION);
    log::debug!("{:?}", config);

    #[cfg(unix)]
    {
        if let Err(e) = run(config) {
            log::error!("{}", e);
            process::exit(1);
        }
    }

    #[cfg(not(unix))]
    {
        let _ = config;
        eprintln!("Error: x11present needs a Unix platform for shared buffers");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("640x480"), Ok((640, 480)));
        assert!(parse_size("640").is_err());
        assert!(parse_size("0x480").is_err());
        assert!(parse_size("640xabc").is_err());
    }

    #[test]
    fn test_pattern_with_padded_stride() {
        let (w, h, stride) = (8u16, 8u16, 40usize);
        let mut pixels = vec![0u8; stride * h as usize];
        test_pattern(&mut pixels, stride, w, h);

        // 2x2 square at (3, 3)
        let at = |x: usize, y: usize| &pixels[y * stride + x * 4..y * stride + x * 4 + 4];
        assert_eq!(at(0, 0), &[0xff; 4]);
        assert_eq!(at(3, 3), &[0, 0, 0, 0xff]);
        assert_eq!(at(4, 4), &[0, 0, 0, 0xff]);
        assert_eq!(at(5, 5), &[0xff; 4]);
    }
}
