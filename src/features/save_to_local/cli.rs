use std::path::PathBuf;

use clap::{Args, Parser};
use derive_getters::Getters;
use dirs::cache_dir;
use path_clean::clean;
use tracing::error;
use url::Url;

use crate::shared::network::{factory::TransportType, http::config::HttpArgs};

#[derive(Clone, Parser)]
pub struct LocalArgs {
    ///Http url of file to download.
    #[arg(short='u',value_parser=parse_url)]
    pub url: Url,
    ///Path to save download.
    #[arg(short='o',value_parser=parse_output_path)]
    pub output: PathBuf,
    #[command(flatten)]
    pub http_args: HttpArgs,
    #[command(flatten)]
    pub transfer_args: TransferArgs,
    ///Transport to use for send and recieving data.
    #[arg(short='t',long,value_enum,default_value_t=TransportType::Http)]
    pub transport: TransportType,
}

#[derive(Debug, Clone, Args, Getters)]
pub struct TransferArgs {
    ///Size in bytes of every part of a multipart download.
    #[arg(short='s',long,default_value_t=8 * 1024 * 1024)]
    pub part_size: u64,
    ///Maximum number of parts downloading at the same time.
    #[arg(short='j',long,default_value_t=4)]
    pub max_concurrent_parts: usize,
    ///Directory holding resume records of interrupted downloads.
    #[arg(long,env="MPDL_RESUME_DIR")]
    pub resume_dir: Option<PathBuf>,
}

impl Default for TransferArgs {
    fn default() -> Self {
        Self { part_size: 8 * 1024 * 1024, max_concurrent_parts: 4, resume_dir: None }
    }
}

impl TransferArgs {
    ///User resume directory or `<cache dir>/.mpdl`.
    pub fn checked_resume_dir(&self) -> Option<PathBuf> {
        self.resume_dir.clone().or_else(|| match cache_dir() {
            Some(cache) => Some(cache.join(".mpdl")),
            None => {
                error!("Can't get user cache directory.");
                None
            }
        })
    }
}

///Perform path validation with this function, if path is a dir,
/// this function will throw an Err, else it will return the expanded and cleaned path.
fn parse_output_path(path: &str) -> Result<PathBuf, String> {
    let expanded = shellexpand::tilde(path);
    let to_path = clean(&*expanded);
    if to_path.is_dir() {
        return Err(format!("Provided path {} is a directory and not a path to a file.", to_path.display()));
    }
    if to_path.file_name().is_none() {
        return Err(format!("Provided path {path} has no file name."));
    }
    Ok(to_path)
}

///This method takes a url as a string literal,checks and validate http
/// scheme in the url,parses it and return a Result Url or String
/// type if any error occur.
fn parse_url(url: &str) -> Result<Url, String> {
    if url.starts_with("https://") || url.starts_with("http://") {
        let parsed_url =
            Url::parse(url).map_err(|e| format!("Invalid Url {url} {e}"));
        return parsed_url;
    }
    let new_url = format!("https://{url}");
    Url::parse(&new_url).map_err(|e| format!("Invalid Url {url} {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_defaults_to_https() {
        assert_eq!(parse_url("example.com/a.iso").map(|u| u.scheme().to_string()), Ok("https".to_string()));
        assert_eq!(parse_url("http://example.com/a.iso").map(|u| u.scheme().to_string()), Ok("http".to_string()));
        assert!(parse_url("http://[::1").is_err());
    }

    #[test]
    fn test_parse_output_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dir_str = dir.path().to_string_lossy().to_string();
        assert!(parse_output_path(&dir_str).is_err());

        let file = format!("{dir_str}/./downloads/../video.mp4");
        assert_eq!(parse_output_path(&file), Ok(dir.path().join("video.mp4")));
    }

    #[test]
    fn test_local_args_parse() {
        let args = LocalArgs::try_parse_from(["local", "-u", "example.com/a.iso", "-o", "/tmp/a.iso", "-s", "1024", "-j", "2"])
            .expect("valid arguments");
        assert_eq!(args.url.as_str(), "https://example.com/a.iso");
        assert_eq!(*args.transfer_args.part_size(), 1024);
        assert_eq!(*args.transfer_args.max_concurrent_parts(), 2);
        assert_eq!(args.transport, TransportType::Http);
    }
}
