//! 单张照片分析：读文件、探测原始尺寸、multipart 上传一次

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::ImageFormat;
use log::info;

use crate::core::capture::frame::Dimensions;
use crate::core::client::{ImagePayload, InferenceRequest, InferenceService};
use crate::core::config::PipelineParams;
use crate::core::error::ClientError;
use crate::core::pipeline::dispatcher::InferenceDispatcher;
use crate::core::pipeline::store::{AnnotationStore, ApplyOutcome, StoreSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub struct PhotoAnalysis {
    pub dimensions: Dimensions,
    /// 更晚选择的照片先返回时为 Stale
    pub outcome: ApplyOutcome,
}

pub struct PhotoSession {
    dispatcher: InferenceDispatcher,
    store: Arc<AnnotationStore>,
}

impl PhotoSession {
    pub fn new(service: Arc<dyn InferenceService>, timeout: Duration) -> Self {
        Self {
            // 一次选择只派发一次，不需要在途上限
            dispatcher: InferenceDispatcher::new(service, timeout, usize::MAX),
            store: Arc::new(AnnotationStore::new()),
        }
    }

    pub async fn analyze_file(&self, path: impl AsRef<Path>) -> Result<PhotoAnalysis, ClientError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        self.analyze_bytes(file_name, bytes).await
    }

    pub async fn analyze_bytes(
        &self,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<PhotoAnalysis, ClientError> {
        let file_name = file_name.into();
        if bytes.is_empty() {
            return Err(ClientError::Validation(format!("{} is empty", file_name)));
        }

        let (format, dimensions) = probe(&bytes)?;
        self.store.set_dimensions(dimensions);
        info!(
            "🖼️ PhotoSession: {} ({:?}, {}x{}, {} bytes)",
            file_name,
            format,
            dimensions.width,
            dimensions.height,
            bytes.len()
        );

        let request = InferenceRequest {
            image: ImagePayload::File {
                file_name,
                mime: mime_for(format).to_string(),
                bytes,
            },
            // multipart 上传只带文件，调节参数走后端默认值
            params: PipelineParams::default(),
        };
        let outcome = self.dispatcher.dispatch_and_wait(request, &self.store).await?;
        Ok(PhotoAnalysis {
            dimensions,
            outcome,
        })
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    pub fn store(&self) -> Arc<AnnotationStore> {
        self.store.clone()
    }
}

fn probe(bytes: &[u8]) -> Result<(ImageFormat, Dimensions), ClientError> {
    let reader = image::io::Reader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| ClientError::Validation("unrecognized image format".into()))?;
    let (width, height) = reader.into_dimensions()?;
    Ok((format, Dimensions::new(width, height)))
}

fn mime_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::testing::{face, result_marked, Reply, ScriptedService};
    use image::{ImageOutputFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        RgbImage::new(width, height)
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    fn session(service: &Arc<ScriptedService>) -> PhotoSession {
        PhotoSession::new(service.clone(), Duration::from_secs(15))
    }

    #[tokio::test(start_paused = true)]
    async fn test_photo_reports_dimensions_and_latency() {
        let service = Arc::new(ScriptedService::new());
        service.script(
            "group.png",
            Duration::from_millis(40),
            Reply::Ok(result_marked(
                42.0,
                vec![face([1.0, 2.0, 3.0, 4.0], 0.9, Some("Ada"), None)],
            )),
        );
        let photo = session(&service);

        let analysis = photo.analyze_bytes("group.png", png(32, 24)).await.unwrap();
        assert_eq!(analysis.dimensions, Dimensions::new(32, 24));
        assert_eq!(analysis.outcome, ApplyOutcome::Applied);

        let snap = photo.snapshot();
        assert_eq!(snap.dimensions, Dimensions::new(32, 24));
        assert_eq!(snap.faces().len(), 1);
        assert_eq!(snap.latency_ms, Some(42.0));
        assert_eq!(service.seen_payloads(), vec!["group.png".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_selection_supersedes_first() {
        let service = Arc::new(ScriptedService::new());
        service.script("first.png", Duration::from_millis(300), Reply::Ok(result_marked(1.0, vec![])));
        service.script("second.png", Duration::from_millis(100), Reply::Ok(result_marked(2.0, vec![])));
        let photo = session(&service);

        let (first, second) = tokio::join!(
            photo.analyze_bytes("first.png", png(10, 10)),
            photo.analyze_bytes("second.png", png(20, 10)),
        );
        assert_eq!(first.unwrap().outcome, ApplyOutcome::Stale);
        assert_eq!(second.unwrap().outcome, ApplyOutcome::Applied);

        let snap = photo.snapshot();
        assert_eq!(snap.latency_ms, Some(2.0));
        assert_eq!(snap.dimensions, Dimensions::new(20, 10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_upload_surfaces_error() {
        let service = Arc::new(ScriptedService::new());
        service.script("bad.png", Duration::ZERO, Reply::Server(400));
        let photo = session(&service);

        let err = photo.analyze_bytes("bad.png", png(4, 4)).await.unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 400, .. }));
        assert!(photo.snapshot().error.is_some());
    }

    #[tokio::test]
    async fn test_rejects_non_images_before_upload() {
        let service = Arc::new(ScriptedService::new());
        let photo = session(&service);

        assert!(matches!(
            photo.analyze_bytes("empty.png", Vec::new()).await,
            Err(ClientError::Validation(_))
        ));
        assert!(photo.analyze_bytes("notes.txt", b"hello".to_vec()).await.is_err());
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn test_analyze_file_reads_from_disk() {
        let service = Arc::new(ScriptedService::new());
        let photo = session(&service);
        let path = std::env::temp_dir().join(format!("facecam_photo_{}.png", std::process::id()));
        std::fs::write(&path, png(12, 8)).unwrap();

        let analysis = photo.analyze_file(&path).await.unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(analysis.dimensions, Dimensions::new(12, 8));
        assert_eq!(service.calls(), 1);
    }
}
