//! 照片标注

use std::sync::Arc;

use flutter_rust_bridge::frb;
use log::info;
use tokio::runtime::Runtime;

use crate::api::error::ApiError;
use crate::api::models::view::AnnotationView;
use crate::core::client::{HttpInferenceClient, InferenceService};
use crate::core::config::ClientConfig;
use crate::core::pipeline::photo::PhotoSession;
use crate::core::render::overlay::OverlayStyle;

/// 照片分析器 - 选择一张图片，上传一次，返回叠加层
///
/// ```dart
/// final analyzer = PhotoAnalyzer.create(baseUrl: null);
/// final view = await analyzer.analyzeFile(path: picked.path);
/// ```
#[frb(opaque)]
pub struct PhotoAnalyzer {
    runtime: Runtime,
    session: PhotoSession,
    style: OverlayStyle,
}

impl PhotoAnalyzer {
    #[frb(sync)]
    pub fn create(base_url: Option<String>) -> Result<Self, ApiError> {
        let config = match base_url {
            Some(url) => ClientConfig::with_base_url(url),
            None => ClientConfig::from_env(),
        };
        let client = HttpInferenceClient::new(&config)?;
        info!("🖼️ PhotoAnalyzer: created, backend {}", client.base_url());
        Self::with_service(Arc::new(client), &config)
    }

    pub(crate) fn with_service(
        service: Arc<dyn InferenceService>,
        config: &ClientConfig,
    ) -> Result<Self, ApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ApiError::runtime)?;
        Ok(Self {
            runtime,
            session: PhotoSession::new(service, config.timeout),
            style: OverlayStyle::default(),
        })
    }

    #[frb(dart_async)]
    pub fn analyze_file(&self, path: String) -> Result<AnnotationView, ApiError> {
        self.runtime.block_on(self.session.analyze_file(&path))?;
        Ok(self.view())
    }

    #[frb(dart_async)]
    pub fn analyze_bytes(&self, file_name: String, bytes: Vec<u8>) -> Result<AnnotationView, ApiError> {
        self.runtime
            .block_on(self.session.analyze_bytes(file_name, bytes))?;
        Ok(self.view())
    }

    /// 最近一次成功的标注；失败时带错误信息
    #[frb(sync)]
    pub fn view(&self) -> AnnotationView {
        AnnotationView::project(&self.session.snapshot(), &self.style)
    }
}

impl Drop for PhotoAnalyzer {
    fn drop(&mut self) {
        info!("🗑️ PhotoAnalyzer: released");
    }
}
