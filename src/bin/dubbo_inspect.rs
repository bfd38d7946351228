use bytes::BytesMut;
use dubbo_codec::codec::{Body, Decoded, DubboCodec, Outcome, Package, Shortfall};
use dubbo_codec::config::CodecConfig;
use dubbo_codec::logging::init_logging;
use std::fs::File;
use std::io::{self, Read};
use std::process;

const USAGE: &str = "usage: dubbo_inspect [--config FILE] [--hex] [FILE]";
const CHUNK_SIZE: usize = 4096;

struct Options {
    config_path: Option<String>,
    hex: bool,
    input_path: Option<String>,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut options = Options {
        config_path: None,
        hex: false,
        input_path: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.get(i).ok_or("--config needs a file")?;
                options.config_path = Some(path.clone());
            }
            "--hex" => options.hex = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            other if other.starts_with("--") => {
                return Err(format!("unknown option {}\n{}", other, USAGE));
            }
            other => {
                if options.input_path.is_some() {
                    return Err(USAGE.to_string());
                }
                options.input_path = Some(other.to_string());
            }
        }
        i += 1;
    }
    Ok(options)
}

/// Parses whitespace separated hex digits, as copied out of a packet dump.
fn decode_hex(text: &[u8]) -> Result<Vec<u8>, String> {
    let digits: Vec<u8> = text.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
    hex::decode(digits).map_err(|e| format!("bad hex dump: {}", e))
}

fn summary(package: &Package) -> String {
    match &package.body {
        Body::Heartbeat => String::new(),
        Body::Request(req) => format!(
            "{}#{}({}) v{} args={}",
            req.path,
            req.method,
            req.parameter_types,
            req.version,
            req.args.len()
        ),
        Body::Response(resp) => match &resp.outcome {
            Outcome::Value(v) => format!("value {}", v),
            Outcome::Null => "null".to_string(),
            Outcome::Exception(ex) => format!("exception {}: {}", ex.class, ex.message),
            Outcome::Error(message) => format!("status {} {:?}", package.header.status, message),
        },
    }
}

fn print_package(codec: &DubboCodec, package: &Package) {
    let serializer = codec
        .registry()
        .get(package.header.serial_id)
        .map(|s| s.name())
        .unwrap_or("?");
    let kind = package
        .kind()
        .map(|k| format!("{:?}", k))
        .unwrap_or_else(|| "Unknown".to_string());
    println!(
        "{:<18} id={:<8} {:<9} {}",
        kind,
        package.header.id,
        serializer,
        summary(package)
    );
}

/// Decodes every complete frame in `buf`. Returns false on a fatal error.
fn drain(codec: &DubboCodec, buf: &mut BytesMut) -> bool {
    loop {
        match codec.unmarshal(buf) {
            Ok(Decoded::Package(package)) => print_package(codec, &package),
            Ok(Decoded::NeedMore(_)) => return true,
            Err(e) if e.is_connection_fatal() => {
                eprintln!("fatal: {}", e);
                return false;
            }
            Err(e) => eprintln!("skipped: {}", e),
        }
    }
}

fn run(options: Options) -> Result<bool, String> {
    let config = match &options.config_path {
        Some(path) => CodecConfig::load(path).map_err(|e| e.to_string())?,
        None => CodecConfig::default(),
    };
    let codec = DubboCodec::new(config);

    let mut reader: Box<dyn Read> = match &options.input_path {
        Some(path) => Box::new(File::open(path).map_err(|e| format!("{}: {}", path, e))?),
        None => Box::new(io::stdin()),
    };

    let mut buf = BytesMut::new();
    if options.hex {
        let mut text = Vec::new();
        reader.read_to_end(&mut text).map_err(|e| e.to_string())?;
        buf.extend_from_slice(&decode_hex(&text)?);
        if !drain(&codec, &mut buf) {
            return Ok(false);
        }
    } else {
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut chunk).map_err(|e| e.to_string())?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if !drain(&codec, &mut buf) {
                return Ok(false);
            }
        }
    }

    if !buf.is_empty() {
        match codec.unmarshal(&mut buf) {
            Ok(Decoded::NeedMore(Shortfall::Body { available, required })) => {
                println!("trailing partial frame: {} of {} bytes", available, required)
            }
            _ => println!("trailing partial header: {} bytes", buf.len()),
        }
    }
    Ok(true)
}

fn main() {
    init_logging("warn");

    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{}", message);
            process::exit(2);
        }
    };

    match run(options) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(message) => {
            eprintln!("error: {}", message);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex_skips_whitespace() {
        assert_eq!(
            decode_hex(b"da bb\n e2 02\t00").unwrap(),
            vec![0xda, 0xbb, 0xe2, 0x02, 0x00]
        );
        assert_eq!(decode_hex(b"DABB").unwrap(), vec![0xda, 0xbb]);
    }

    #[test]
    fn test_decode_hex_rejects_bad_input() {
        assert!(decode_hex(b"dab").is_err());
        assert!(decode_hex(b"zz").is_err());
    }
}
