// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Experience Builder installer.
//!
//! Download the archive of a cataloged Experience Builder version, and
//! extract it into a destination directory. The archive is kept next to the
//! extracted files as `experience_builder_<version>.zip`.

use crate::config::{ConfigError, VersionCatalog};

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fs::File,
    path::{Path, PathBuf},
};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

/// Download and extract Experience Builder version into destination.
///
/// Creates the destination directory if it does not exist yet. Returns the
/// path to the downloaded archive.
///
/// # Errors
///
/// - Return [`DownloadError::Config`] if the version is not cataloged.
/// - Return [`DownloadError::Request`] or [`DownloadError::HttpStatus`] if the
///   download fails.
/// - Return [`DownloadError::Zip`] if the archive cannot be extracted.
#[instrument(skip(catalog, destination), level = "debug")]
pub async fn install_platform(
    catalog: &VersionCatalog,
    version: &str,
    destination: impl AsRef<Path>,
) -> Result<PathBuf> {
    let destination = destination.as_ref();
    let url = catalog.download_url(version)?;

    mkdirp::mkdirp(destination).map_err(|source| DownloadError::Io {
        source,
        path: destination.into(),
    })?;

    let archive = destination.join(format!("experience_builder_{version}.zip"));
    info!("downloading Experience Builder version {version} from {url}");
    download(url, &archive).await?;
    extract_archive(&archive, destination)?;
    info!(
        "Experience Builder version {version} installed in {}",
        destination.display()
    );

    Ok(archive)
}

/// Stream remote file into local file with a progress bar.
///
/// # Errors
///
/// - Return [`DownloadError::Request`] if the request fails mid-flight.
/// - Return [`DownloadError::HttpStatus`] if the server does not answer with
///   a success status.
/// - Return [`DownloadError::Io`] if the local file cannot be written.
pub async fn download(url: &str, path: &Path) -> Result<()> {
    let response = reqwest::get(url).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::HttpStatus {
            url: url.into(),
            status,
        });
    }

    let bar = ProgressBar::new(response.content_length().unwrap_or(0));
    bar.set_style(
        ProgressStyle::with_template(
            "{elapsed_precise:.green}  {bytes:>10}/{total_bytes:<10}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco."),
    );

    let io_error = |source: std::io::Error| DownloadError::Io {
        source,
        path: path.into(),
    };
    let mut file = tokio::fs::File::create(path).await.map_err(io_error)?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await.map_err(io_error)?;
        bar.inc(chunk.len() as u64);
    }
    file.flush().await.map_err(io_error)?;
    bar.finish_and_clear();

    Ok(())
}

/// Extract zip archive into destination directory.
///
/// # Errors
///
/// - Return [`DownloadError::Io`] if the archive cannot be opened.
/// - Return [`DownloadError::Zip`] if the archive is invalid, or cannot be
///   extracted.
pub fn extract_archive(archive: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<()> {
    let file = File::open(archive.as_ref()).map_err(|source| DownloadError::Io {
        source,
        path: archive.as_ref().into(),
    })?;
    let mut zip = zip::ZipArchive::new(file)?;
    info!(
        "extracting {} entries into {}",
        zip.len(),
        destination.as_ref().display()
    );
    zip.extract(destination.as_ref())?;

    Ok(())
}

/// Installer error types.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Version lookup fails.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Request fails.
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    /// Server answers with unsuccessful status.
    #[error("download of {url} failed with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Local file operation fails.
    #[error("failed to access {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Archive cannot be extracted.
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = DownloadError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use crate::workflow::{Error, ErrorKind};
    use std::{fs::read_to_string, io::Cursor, io::Write};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        runtime::Runtime,
    };
    use zip::{write::SimpleFileOptions, ZipWriter};

    fn runtime() -> std::io::Result<Runtime> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
    }

    fn archive_bytes() -> anyhow::Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(
            "ArcGISExperienceBuilder/client/package.json",
            SimpleFileOptions::default(),
        )?;
        writer.write_all(br#"{ "name": "exb-client" }"#)?;
        Ok(writer.finish()?.into_inner())
    }

    // Answer exactly one request with given status line and body.
    async fn serve_once(status: &'static str, body: Vec<u8>) -> std::io::Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut request = vec![0; 4096];
                let _ = socket.read(&mut request).await;
                let head = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            }
        });

        Ok(format!("http://{addr}/exb-1.16.zip"))
    }

    fn catalog(url: &str) -> anyhow::Result<VersionCatalog> {
        Ok(format!(r#"{{ "Experience_Builder": {{ "1.16": "{url}" }} }}"#).parse()?)
    }

    #[sealed_test]
    fn extract_archive_into_destination() -> anyhow::Result<()> {
        let mut writer = ZipWriter::new(File::create("exb.zip")?);
        writer.add_directory("ArcGISExperienceBuilder/client/", SimpleFileOptions::default())?;
        writer.start_file(
            "ArcGISExperienceBuilder/client/package.json",
            SimpleFileOptions::default(),
        )?;
        writer.write_all(br#"{ "name": "exb-client" }"#)?;
        writer.finish()?;

        extract_archive("exb.zip", "install")?;
        assert_eq!(
            read_to_string("install/ArcGISExperienceBuilder/client/package.json")?,
            r#"{ "name": "exb-client" }"#
        );
        Ok(())
    }

    #[sealed_test]
    fn extract_invalid_archive() -> anyhow::Result<()> {
        std::fs::write("exb.zip", "not a zip")?;
        let result = extract_archive("exb.zip", "install");
        assert!(matches!(result, Err(DownloadError::Zip(_))));
        Ok(())
    }

    #[sealed_test]
    fn install_unknown_version() -> anyhow::Result<()> {
        let catalog: VersionCatalog = r#"{ "Experience_Builder": {} }"#.parse()?;
        let result = runtime()?.block_on(install_platform(&catalog, "1.16", "install"));
        assert!(matches!(
            result,
            Err(DownloadError::Config(ConfigError::IdentifierNotFound { .. }))
        ));
        assert!(!Path::new("install").exists());
        Ok(())
    }

    #[sealed_test]
    fn install_downloads_and_extracts_archive() -> anyhow::Result<()> {
        let runtime = runtime()?;
        let archive = runtime.block_on(async {
            let url = serve_once("200 OK", archive_bytes()?).await?;
            Ok::<_, anyhow::Error>(install_platform(&catalog(&url)?, "1.16", "install").await?)
        })?;

        assert_eq!(archive, PathBuf::from("install/experience_builder_1.16.zip"));
        assert!(archive.is_file());
        assert_eq!(
            read_to_string("install/ArcGISExperienceBuilder/client/package.json")?,
            r#"{ "name": "exb-client" }"#
        );
        Ok(())
    }

    #[sealed_test]
    fn install_rejects_unsuccessful_status() -> anyhow::Result<()> {
        let runtime = runtime()?;
        let result = runtime.block_on(async {
            let url = serve_once("404 Not Found", b"missing".to_vec()).await?;
            Ok::<_, anyhow::Error>(install_platform(&catalog(&url)?, "1.16", "install").await)
        })?;

        assert!(matches!(
            result,
            Err(DownloadError::HttpStatus { status, .. }) if status == reqwest::StatusCode::NOT_FOUND
        ));
        let error = Error::from(result.unwrap_err());
        assert_eq!(error.kind(), ErrorKind::ExternalProcessFailure);
        assert!(!Path::new("install/experience_builder_1.16.zip").exists());
        Ok(())
    }
}
