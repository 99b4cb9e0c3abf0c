//! PDF Seal command line
//!
//! Signs and validates PDF documents with the key material configured through
//! the environment (`KEYS_DIR_SECURE`, `PRIVATE_KEY_PASSPHRASE`,
//! `CERTIFICATE_VALIDITY_DAYS`).
//!
//! Usage:
//!   pdf_seal keygen
//!   pdf_seal cert-info
//!   pdf_seal export-key
//!   pdf_seal sign <in.pdf> <out.pdf> [--signer NAME] [--certificate] [--record FILE]
//!   pdf_seal validate <file.pdf> [--record FILE]
//!
//! Results are printed as JSON. `validate` exits with status 1 when the
//! document is not valid.

use pdf_seal::pdf::{SignatureStamp, StampImage};
use pdf_seal::{
    EngineConfig, IntegrityValidator, KeyMaterialStore, SealingPipeline, SignatureEngine,
    SignatureRecord, SignatureScheme,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const USAGE: &str = "usage: pdf_seal <keygen|cert-info|export-key|sign|validate> [args]";

struct SignArgs {
    input: PathBuf,
    output: PathBuf,
    signers: Vec<String>,
    logo: Option<PathBuf>,
    scheme: SignatureScheme,
    record: Option<PathBuf>,
}

impl SignArgs {
    fn from_args(args: &[String]) -> CliResult<Self> {
        let mut positional = Vec::new();
        let mut signers = Vec::new();
        let mut logo = None;
        let mut scheme = SignatureScheme::LegacyPssOverDigest;
        let mut record = None;

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--signer" => {
                    i += 1;
                    signers.push(format!("Name: {}", value(args, i, "--signer")?));
                },
                "--line" => {
                    i += 1;
                    signers.push(value(args, i, "--line")?.to_string());
                },
                "--logo" => {
                    i += 1;
                    logo = Some(PathBuf::from(value(args, i, "--logo")?));
                },
                "--certificate" => {
                    scheme = SignatureScheme::CertificatePkcs1v15OverContent;
                },
                "--record" => {
                    i += 1;
                    record = Some(PathBuf::from(value(args, i, "--record")?));
                },
                other => positional.push(other.to_string()),
            }
            i += 1;
        }

        match positional.as_slice() {
            [input, output] => Ok(Self {
                input: PathBuf::from(input),
                output: PathBuf::from(output),
                signers,
                logo,
                scheme,
                record,
            }),
            _ => Err("sign needs <in.pdf> <out.pdf>".into()),
        }
    }
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> CliResult<&'a str> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} needs a value", flag).into())
}

fn print_json(value: &impl serde::Serialize) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn keygen(store: &KeyMaterialStore) -> CliResult<ExitCode> {
    store.ensure_keys()?;
    let cert = store.ensure_certificate()?;
    print_json(&serde_json::json!({
        "key_dir": store.key_dir(),
        "public_key": store.public_key_info()?,
        "certificate": cert.info(),
        "certificate_status": cert.status(),
    }))?;
    Ok(ExitCode::SUCCESS)
}

fn cert_info(store: &KeyMaterialStore) -> CliResult<ExitCode> {
    print_json(&serde_json::json!({
        "certificate": store.certificate_info()?,
        "certificate_status": store.certificate_status(),
    }))?;
    Ok(ExitCode::SUCCESS)
}

fn sign(engine: SignatureEngine, args: &[String]) -> CliResult<ExitCode> {
    let args = SignArgs::from_args(args)?;
    let source = std::fs::read(&args.input)?;

    let mut stamp = SignatureStamp::new(args.signers, chrono::Local::now().naive_local());
    if let Some(logo) = &args.logo {
        stamp = stamp.with_logo(StampImage::from_file(logo)?);
    }

    let sealed = SealingPipeline::new(engine).seal(&source, &stamp, args.scheme)?;
    std::fs::write(&args.output, &sealed.bytes)?;
    if let Some(path) = &args.record {
        std::fs::write(path, sealed.record.to_json()?)?;
    }

    print_json(&sealed.record)?;
    Ok(ExitCode::SUCCESS)
}

fn validate(engine: SignatureEngine, args: &[String]) -> CliResult<ExitCode> {
    let mut file = None;
    let mut record_path = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--record" => {
                i += 1;
                record_path = Some(PathBuf::from(value(args, i, "--record")?));
            },
            other => file = Some(PathBuf::from(other)),
        }
        i += 1;
    }

    let file = file.ok_or("validate needs <file.pdf>")?;
    let record = match &record_path {
        Some(path) => Some(SignatureRecord::from_json(&std::fs::read_to_string(path)?)?),
        None => None,
    };

    let result = IntegrityValidator::new(engine).validate_file(&file, record.as_ref())?;
    print_json(&result)?;
    Ok(if result.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run(args: &[String]) -> CliResult<ExitCode> {
    let command = args.first().ok_or(USAGE)?;
    let store = Arc::new(KeyMaterialStore::open(EngineConfig::from_env())?);

    match command.as_str() {
        "keygen" => keygen(&store),
        "cert-info" => cert_info(&store),
        "export-key" => {
            print!("{}", store.export_public_key_pem()?);
            Ok(ExitCode::SUCCESS)
        },
        "sign" => sign(SignatureEngine::new(store), &args[1..]),
        "validate" => validate(SignatureEngine::new(store), &args[1..]),
        _ => Err(USAGE.into()),
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        },
    }
}
