//! Upload to slow.pics and Discord webhook notification.
//!
//! A collection is one multipart POST. Image `j` of clip `i` becomes the
//! `i`-th image of comparison `j`, so every clip must contribute the same
//! number of stills in the same order. The service expects the `XSRF-TOKEN`
//! cookie from a prior GET to be echoed back in an `X-XSRF-TOKEN` header.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{SecondsFormat, Utc};
use reqwest::{
    Url,
    blocking::{
        Client,
        multipart::{Form, Part},
    },
    cookie::{CookieStore, Jar},
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT},
};
use serde_json::{Value, json};

use crate::configuration::RenderOptions;
use crate::error::CompshotError;
use crate::progress::{OperationType, ProgressTracker};

const COMPARISON_API: &str = "https://slow.pics/api/comparison";
const COLLECTION_URL: &str = "https://slow.pics/c/";
const SHORTCUT_FILE: &str = "slow.pics.url";
const BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const EMBED_COLOR: u32 = 0x03b2f8;
const EMBED_ICON: &str =
    "https://slow.pics/icons/apple-icon-120x120-62b1b8f5767f40f08522e36e58b948f4.png";

/// Settings for one upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct UploadOptions {
    /// Collection title. May be empty.
    pub collection_name: String,
    /// List the collection publicly.
    pub public: bool,
    /// Discord webhook to notify after a successful upload.
    pub webhook_url: Option<String>,
}

impl UploadOptions {
    /// An unnamed, private collection without a webhook.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection title.
    pub fn with_collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self
    }

    /// Whether the collection is public.
    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Post a notification to this Discord webhook.
    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }
}

/// What happened to the webhook notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// No webhook was configured.
    NotRequested,
    /// The payload was accepted.
    Delivered,
    /// Delivery failed. The upload itself still succeeded.
    Failed(String),
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Public URL of the collection.
    pub url: String,
    /// Internet shortcut written next to the images.
    pub shortcut: PathBuf,
    /// Webhook delivery result.
    pub webhook: WebhookOutcome,
}

/// One field of the upload form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormField {
    /// A plain text value.
    Text {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// A PNG file.
    Image {
        /// Field name.
        name: String,
        /// File to attach.
        path: PathBuf,
    },
}

/// All `*.png` files directly inside `directory`, sorted by name.
///
/// # Errors
///
/// I/O errors listing the directory.
pub fn collect_images(directory: &Path) -> Result<Vec<PathBuf>, CompshotError> {
    let mut images = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("png"));
        if is_png && path.is_file() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Build the form for `clips`, each a name plus its ordered stills.
pub fn form_fields(options: &UploadOptions, clips: &[(String, Vec<PathBuf>)]) -> Vec<FormField> {
    let mut fields = vec![
        FormField::Text {
            name: "collectionName".to_string(),
            value: options.collection_name.clone(),
        },
        FormField::Text {
            name: "public".to_string(),
            value: options.public.to_string(),
        },
        FormField::Text {
            name: "optimize-images".to_string(),
            value: "true".to_string(),
        },
    ];

    let mut named = 0;
    for (clip_index, (clip_name, images)) in clips.iter().enumerate() {
        for (comparison, image) in images.iter().enumerate() {
            if comparison == named {
                named += 1;
                fields.push(FormField::Text {
                    name: format!("comparisons[{comparison}].name"),
                    value: format!("{comparison:05}"),
                });
            }
            fields.push(FormField::Text {
                name: format!("comparisons[{comparison}].images[{clip_index}].name"),
                value: clip_name.clone(),
            });
            fields.push(FormField::Image {
                name: format!("comparisons[{comparison}].images[{clip_index}].file"),
                path: image.clone(),
            });
        }
    }
    fields
}

fn build_form(fields: Vec<FormField>, tracker: &mut ProgressTracker) -> Result<Form, CompshotError> {
    let mut form = Form::new();
    let mut image_index = 0;
    for field in fields {
        form = match field {
            FormField::Text { name, value } => form.text(name, value),
            FormField::Image { name, path } => {
                let file_name = path
                    .file_name()
                    .map(|file_name| file_name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let part = Part::bytes(fs::read(&path)?)
                    .file_name(file_name)
                    .mime_str("image/png")?;
                tracker.advance(image_index);
                image_index += 1;
                form.part(name, part)
            }
        };
    }
    tracker.finish();
    Ok(form)
}

/// Value of cookie `name` in a `Cookie` header.
fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

fn browser_headers(token: &str) -> Result<HeaderMap, CompshotError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(ORIGIN, HeaderValue::from_static("https://slow.pics/"));
    headers.insert(REFERER, HeaderValue::from_static("https://slow.pics/comparison"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_AGENT));
    let token = HeaderValue::from_str(token)
        .map_err(|error| CompshotError::Upload(format!("unusable XSRF token: {error}")))?;
    headers.insert("X-XSRF-TOKEN", token);
    Ok(headers)
}

/// Upload the stills of `clips` as one collection and write
/// `<folder>/slow.pics.url`.
///
/// Reading each still into the request is reported to the callback in
/// `progress` as [`OperationType::Upload`].
///
/// # Errors
///
/// [`CompshotError::Upload`] for HTTP failures or a missing session cookie,
/// and I/O errors reading images or writing the shortcut. Webhook failures
/// are reported in [`UploadReport::webhook`] instead.
pub fn upload(
    folder: &Path,
    clips: &[(String, Vec<PathBuf>)],
    options: &UploadOptions,
    progress: &RenderOptions,
) -> Result<UploadReport, CompshotError> {
    let api = Url::parse(COMPARISON_API)
        .map_err(|error| CompshotError::Upload(error.to_string()))?;
    let jar = Arc::new(Jar::default());
    let client = Client::builder().cookie_provider(Arc::clone(&jar)).build()?;

    client.get(api.clone()).send()?.error_for_status()?;
    let token = jar
        .cookies(&api)
        .and_then(|header| header.to_str().ok().and_then(|cookies| cookie_value(cookies, "XSRF-TOKEN")))
        .ok_or_else(|| CompshotError::Upload("slow.pics did not set an XSRF-TOKEN cookie".to_string()))?;

    let total = clips.iter().map(|(_, images)| images.len() as u64).sum();
    let mut tracker = ProgressTracker::new(
        Arc::clone(&progress.progress),
        OperationType::Upload,
        Some(total),
        progress.batch_size,
    );
    let form = build_form(form_fields(options, clips), &mut tracker)?;
    log::info!("Uploading images...");
    let key = client
        .post(api)
        .headers(browser_headers(&token)?)
        .multipart(form)
        .send()?
        .error_for_status()?
        .text()?;

    let url = format!("{COLLECTION_URL}{}", key.trim());
    log::info!("Slowpics url: {url}");

    let shortcut = folder.join(SHORTCUT_FILE);
    fs::write(&shortcut, format!("[InternetShortcut]\nURL={url}"))?;

    let webhook = match &options.webhook_url {
        None => WebhookOutcome::NotRequested,
        Some(webhook_url) => match notify(&client, webhook_url, &options.collection_name, &url) {
            Ok(()) => {
                log::info!("Webhook payload delivered successfully");
                WebhookOutcome::Delivered
            }
            Err(error) => {
                log::warn!("Failed to deliver payload to webhook: {error}");
                WebhookOutcome::Failed(error.to_string())
            }
        },
    };

    Ok(UploadReport {
        url,
        shortcut,
        webhook,
    })
}

/// The Discord payload announcing a collection.
pub fn webhook_payload(collection_name: &str, url: &str, timestamp: &str) -> Value {
    let title = if collection_name.is_empty() {
        "unknown"
    } else {
        collection_name
    };
    json!({
        "username": "slow.pics",
        "embeds": [{
            "title": format!("{title} | Slowpoke Pics"),
            "description": "slowpics Comparison Service",
            "author": {
                "name": "Slowpoke Pics",
                "icon_url": EMBED_ICON,
            },
            "color": EMBED_COLOR,
            "timestamp": timestamp,
            "url": url,
        }],
    })
}

fn notify(
    client: &Client,
    webhook_url: &str,
    collection_name: &str,
    url: &str,
) -> Result<(), CompshotError> {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    client
        .post(webhook_url)
        .json(&webhook_payload(collection_name, url, &timestamp))
        .send()
        .and_then(|response| response.error_for_status())
        .map_err(|error| CompshotError::Webhook(error.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ProgressCallback, ProgressInfo};

    #[test]
    fn fields_pair_images_across_clips() {
        let clips = vec![
            (
                "src".to_string(),
                vec![PathBuf::from("src_00000.png"), PathBuf::from("src_00001.png")],
            ),
            (
                "enc".to_string(),
                vec![PathBuf::from("enc_00000.png"), PathBuf::from("enc_00001.png")],
            ),
        ];
        let options = UploadOptions::new().with_collection_name("test").with_public(true);
        let fields = form_fields(&options, &clips);

        assert_eq!(
            fields[1],
            FormField::Text {
                name: "public".to_string(),
                value: "true".to_string()
            }
        );
        assert!(fields.contains(&FormField::Text {
            name: "comparisons[1].name".to_string(),
            value: "00001".to_string()
        }));
        assert!(fields.contains(&FormField::Image {
            name: "comparisons[1].images[1].file".to_string(),
            path: PathBuf::from("enc_00001.png")
        }));
        // 3 collection fields, 2 comparison names, 2 fields per image.
        assert_eq!(fields.len(), 3 + 2 + 2 * 4);
    }

    #[test]
    fn later_clip_with_more_stills_names_extra_comparisons() {
        let clips = vec![
            ("src".to_string(), vec![PathBuf::from("src_00000.png")]),
            (
                "enc".to_string(),
                vec![
                    PathBuf::from("enc_00000.png"),
                    PathBuf::from("enc_00001.png"),
                    PathBuf::from("enc_00002.png"),
                ],
            ),
        ];
        let fields = form_fields(&UploadOptions::new(), &clips);

        let names: Vec<&str> = fields
            .iter()
            .filter_map(|field| match field {
                FormField::Text { name, value } if name.ends_with("].name") && !name.contains("images") => {
                    Some(value.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["00000", "00001", "00002"]);
    }

    struct Recorder(std::sync::Mutex<Vec<ProgressInfo>>);

    impl ProgressCallback for Recorder {
        fn on_progress(&self, info: &ProgressInfo) {
            self.0.lock().unwrap().push(info.clone());
        }
    }

    #[test]
    fn reading_stills_reports_upload_progress() {
        let directory = tempfile::tempdir().unwrap();
        let mut clips = Vec::new();
        for name in ["src", "enc"] {
            let path = directory.path().join(format!("{name}_00000.png"));
            fs::write(&path, b"png").unwrap();
            clips.push((name.to_string(), vec![path]));
        }
        let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
        let mut tracker = ProgressTracker::new(recorder.clone(), OperationType::Upload, Some(2), 1);

        build_form(form_fields(&UploadOptions::new(), &clips), &mut tracker).unwrap();

        let infos = recorder.0.lock().unwrap();
        assert_eq!(infos.len(), 2);
        assert!(infos.iter().all(|info| info.operation == OperationType::Upload));
        assert_eq!(infos[1].current, 2);
        assert_eq!(infos[1].percentage, Some(100.0));
    }

    #[test]
    fn finds_cookie_value() {
        let header = "laravel_session=abc; XSRF-TOKEN=tok%3D123; other=1";
        assert_eq!(cookie_value(header, "XSRF-TOKEN").as_deref(), Some("tok%3D123"));
        assert_eq!(cookie_value(header, "missing"), None);
    }

    #[test]
    fn payload_defaults_collection_name() {
        let payload = webhook_payload("", "https://slow.pics/c/abc", "2024-01-01T00:00:00.000Z");
        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "unknown | Slowpoke Pics");
        assert_eq!(embed["color"], 242424);
        assert_eq!(embed["url"], "https://slow.pics/c/abc");
        assert_eq!(payload["username"], "slow.pics");
    }

    #[test]
    fn collects_only_png_sorted() {
        let directory = tempfile::tempdir().unwrap();
        for name in ["b_00001.png", "a_00000.png", "notes.txt"] {
            fs::write(directory.path().join(name), b"").unwrap();
        }
        let images = collect_images(directory.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_00000.png", "b_00001.png"]);
    }
}
