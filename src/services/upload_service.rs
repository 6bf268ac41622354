use crate::config::AppConfig;
use crate::utils::AppError;
use actix_multipart::Multipart;
use futures::StreamExt;
use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Sub-directory of `UPLOAD_DIR` a flow writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget {
    Memberships,
    Payments,
    Borrows,
}

impl UploadTarget {
    pub fn dir_name(&self) -> &'static str {
        match self {
            UploadTarget::Memberships => "memberships",
            UploadTarget::Payments => "payments",
            UploadTarget::Borrows => "borrows",
        }
    }
}

const PUBLIC_PREFIX: &str = "uploads";

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub original_name: Option<String>,
    /// Path on disk, `UPLOAD_DIR/<target>/<name>`.
    pub path: PathBuf,
    /// `uploads/<target>/<name>`, independent of where `UPLOAD_DIR` lives.
    public_path: String,
    pub size: usize,
}

impl StoredFile {
    /// Path as stored in documents and served under `/uploads`.
    pub fn public_path(&self) -> String {
        self.public_path.clone()
    }
}

/// Maps a stored `uploads/<target>/<name>` path back into `upload_dir`.
/// Anything else, including `..` segments, resolves to nothing.
pub fn resolve_public_path(upload_dir: &Path, public_path: &str) -> Option<PathBuf> {
    let relative = public_path.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;
    let mut resolved = upload_dir.to_path_buf();
    for segment in relative.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return None;
        }
        resolved.push(segment);
    }
    Some(resolved)
}

/// Text fields and stored image files of one multipart request.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    files: HashMap<String, StoredFile>,
}

impl UploadForm {
    #[cfg(test)]
    pub(crate) fn with_fields(fields: HashMap<String, String>) -> Self {
        UploadForm { fields, files: HashMap::new() }
    }

    /// Trimmed, non-empty text value.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn file(&self, name: &str) -> Option<&StoredFile> {
        self.files.get(name)
    }

    pub fn require_file(&self, name: &str, message: &str) -> Result<&StoredFile, AppError> {
        self.file(name)
            .ok_or_else(|| AppError::InvalidRequest(message.to_string()))
    }

    /// Removes every file this request stored.
    pub async fn discard(&self) {
        for file in self.files.values() {
            remove_path(&file.path).await;
        }
    }
}

/// `<prefix>-<unix millis>-<random><ext>`, extension taken from the client filename.
pub fn generate_file_name(prefix: &str, original_name: Option<&str>) -> String {
    let ext = original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();

    let random: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{}-{}-{}{}", prefix, chrono::Utc::now().timestamp_millis(), random, ext)
}

fn is_image(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
}

/// Reads a multipart body. Fields named in `file_fields` are stored as images,
/// all other fields are kept as text. Any error removes the files already written.
pub async fn read_upload_form(
    mut payload: Multipart,
    config: &AppConfig,
    target: UploadTarget,
    file_fields: &[&str],
) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    match read_fields(&mut payload, config, target, file_fields, &mut form).await {
        Ok(()) => Ok(form),
        Err(e) => {
            form.discard().await;
            Err(e)
        }
    }
}

async fn read_fields(
    payload: &mut Multipart,
    config: &AppConfig,
    target: UploadTarget,
    file_fields: &[&str],
    form: &mut UploadForm,
) -> Result<(), AppError> {
    let dir = config.upload_dir.join(target.dir_name());
    tokio::fs::create_dir_all(&dir).await?;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::UploadError(format!("Multipart error: {}", e)))?;

        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or("").to_string();
        let filename = disposition.get_filename().map(|s| s.to_string());

        if !file_fields.contains(&name.as_str()) {
            let mut bytes = Vec::new();
            while let Some(chunk) = field.next().await {
                let data = chunk.map_err(|e| AppError::UploadError(format!("Multipart error: {}", e)))?;
                bytes.extend_from_slice(&data);
                if bytes.len() > 64 * 1024 {
                    return Err(AppError::UploadError(format!("Field '{}' is too large", name)));
                }
            }
            form.fields.insert(name, String::from_utf8_lossy(&bytes).into_owned());
            continue;
        }

        let content_type = field.content_type().map(|m| m.essence_str().to_string());
        if !is_image(content_type.as_deref()) {
            return Err(AppError::UploadError(format!("Only image files are allowed for '{}'", name)));
        }

        // A second part would replace the first in the map and leave its file behind
        if form.files.contains_key(&name) {
            return Err(AppError::UploadError(format!("Only one file is allowed for '{}'", name)));
        }

        let file_name = generate_file_name(&name, filename.as_deref());
        let path = dir.join(&file_name);
        let mut file = tokio::fs::File::create(&path).await?;

        // Registered before writing so a failed write is cleaned up too
        form.files.insert(
            name.clone(),
            StoredFile {
                original_name: filename,
                path: path.clone(),
                public_path: format!("{}/{}/{}", PUBLIC_PREFIX, target.dir_name(), file_name),
                size: 0,
            },
        );

        let mut size = 0usize;
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| AppError::UploadError(format!("Multipart error: {}", e)))?;
            size += data.len();
            if size > config.max_upload_bytes {
                return Err(AppError::UploadError(format!(
                    "File '{}' exceeds the {} byte limit",
                    name, config.max_upload_bytes
                )));
            }
            file.write_all(&data).await?;
        }
        file.flush().await?;

        if let Some(stored) = form.files.get_mut(&name) {
            stored.size = size;
        }
        log::debug!("📎 Stored upload {} ({} bytes)", path.display(), size);
    }

    Ok(())
}

/// Removes a stored upload given its public path; returns whether a file was actually deleted.
pub async fn delete_file_if_exists(upload_dir: &Path, public_path: &str) -> bool {
    match resolve_public_path(upload_dir, public_path) {
        Some(path) => remove_path(&path).await,
        None => {
            if !public_path.is_empty() {
                log::warn!("⚠️  Ignoring upload path outside {}: {}", PUBLIC_PREFIX, public_path);
            }
            false
        }
    }
}

async fn remove_path(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            log::warn!("⚠️  Could not delete {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use actix_multipart::Multipart;
    use actix_web::{error::PayloadError, http::header, web::Bytes};

    const BOUNDARY: &str = "library-test-boundary";

    pub enum Part<'a> {
        Text(&'a str, &'a str),
        /// Field name and client filename of a small PNG part.
        Image(&'a str, &'a str),
    }

    pub fn multipart(parts: &[Part<'_>]) -> Multipart {
        let mut body = String::new();
        for part in parts {
            body.push_str(&format!("--{}\r\n", BOUNDARY));
            match part {
                Part::Text(name, value) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    name, value
                )),
                Part::Image(name, filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\nnot-really-a-png\r\n",
                    name, filename
                )),
            }
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_str(&format!("multipart/form-data; boundary={}", BOUNDARY)).unwrap(),
        );
        let stream = futures::stream::once(async move { Ok::<_, PayloadError>(Bytes::from(body)) });
        Multipart::new(&headers, stream)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{multipart, Part};
    use super::*;

    #[test]
    fn test_generate_file_name() {
        let name = generate_file_name("id_card", Some("Scan 01.PNG"));
        assert!(name.starts_with("id_card-"));
        assert!(name.ends_with(".png"));
        assert_eq!(name.split('-').count(), 3);

        let bare = generate_file_name("screenshot", None);
        assert!(!bare.contains('.'));

        let weird = generate_file_name("screenshot", Some("evil.ph/p"));
        assert!(!weird.contains('/'));
    }

    #[test]
    fn test_image_content_types() {
        assert!(is_image(Some("image/png")));
        assert!(is_image(Some("IMAGE/JPEG")));
        assert!(!is_image(Some("application/pdf")));
        assert!(!is_image(None));
    }

    #[test]
    fn test_form_text_is_trimmed() {
        let mut form = UploadForm::default();
        form.fields.insert("payment_amount".into(), " 150 ".into());
        form.fields.insert("payment_reference".into(), "   ".into());

        assert_eq!(form.text("payment_amount"), Some("150"));
        assert_eq!(form.text("payment_reference"), None);
        assert!(form.require_file("id_card", "ID card image is required").is_err());
    }

    fn config_in(dir_name: &str) -> AppConfig {
        let mut config = crate::config::test_config();
        config.upload_dir = std::env::temp_dir().join(dir_name);
        let _ = std::fs::remove_dir_all(&config.upload_dir);
        config
    }

    fn files_in(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.file_name().to_string_lossy().into_owned()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_repeated_file_field_leaves_nothing_on_disk() {
        let config = config_in("library-upload-repeat-test");
        let payload = multipart(&[
            Part::Text("payment_amount", "150"),
            Part::Image("id_card", "front.png"),
            Part::Image("id_card", "back.png"),
        ]);

        let err = read_upload_form(payload, &config, UploadTarget::Memberships, &["id_card"])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UploadError(_)));
        assert!(err.message().contains("id_card"));
        assert!(files_in(&config.upload_dir.join("memberships")).is_empty());
    }

    #[tokio::test]
    async fn test_stored_path_is_relative_to_upload_mount() {
        let config = config_in("library-upload-public-path-test");
        let payload = multipart(&[Part::Image("screenshot", "Proof.PNG"), Part::Text("amount", "20")]);

        let form = read_upload_form(payload, &config, UploadTarget::Payments, &["screenshot"])
            .await
            .unwrap();
        assert_eq!(form.text("amount"), Some("20"));

        let stored = form.file("screenshot").unwrap();
        let public = stored.public_path();
        assert!(public.starts_with("uploads/payments/screenshot-"));
        assert!(public.ends_with(".png"));
        assert!(!public.starts_with(&config.upload_dir.display().to_string()));
        assert_eq!(resolve_public_path(&config.upload_dir, &public).unwrap(), stored.path);

        assert!(delete_file_if_exists(&config.upload_dir, &public).await);
        assert!(!delete_file_if_exists(&config.upload_dir, &public).await);
        assert!(files_in(&config.upload_dir.join("payments")).is_empty());
    }

    #[test]
    fn test_resolve_public_path_stays_inside_upload_dir() {
        let root = Path::new("/srv/library/uploads");
        assert_eq!(
            resolve_public_path(root, "uploads/memberships/id_card-1-2.png").unwrap(),
            root.join("memberships").join("id_card-1-2.png")
        );
        assert!(resolve_public_path(root, "uploads/../etc/passwd").is_none());
        assert!(resolve_public_path(root, "uploads/memberships//x.png").is_none());
        assert!(resolve_public_path(root, "/etc/passwd").is_none());
        assert!(resolve_public_path(root, "uploadsx/a.png").is_none());
        assert!(resolve_public_path(root, "").is_none());
    }
}
