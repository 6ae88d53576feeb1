//! 人员库：登记、列表、删除、健康检查

use flutter_rust_bridge::frb;
use log::info;
use tokio::runtime::Runtime;

use crate::api::error::ApiError;
use crate::api::models::pipeline::{
    DeleteResponse, EnrollRequest, EnrollResponse, HealthResponse, PersonsResponse,
};
use crate::core::capture::frame::to_data_url;
use crate::core::client::HttpInferenceClient;
use crate::core::config::ClientConfig;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

#[frb(opaque)]
pub struct PersonDirectory {
    runtime: Runtime,
    client: HttpInferenceClient,
}

impl PersonDirectory {
    #[frb(sync)]
    pub fn create(base_url: Option<String>) -> Result<Self, ApiError> {
        let config = match base_url {
            Some(url) => ClientConfig::with_base_url(url),
            None => ClientConfig::from_env(),
        };
        let client = HttpInferenceClient::new(&config)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ApiError::runtime)?;
        info!("📇 PersonDirectory: created, backend {}", client.base_url());
        Ok(Self { runtime, client })
    }

    /// 登记新人员，`images` 为 data URL
    #[frb(dart_async)]
    pub fn enroll(
        &self,
        name: String,
        images: Vec<String>,
        notes: Option<String>,
    ) -> Result<EnrollResponse, ApiError> {
        let request = enroll_request(name, images, notes)?;
        let response = self.runtime.block_on(self.client.enroll(&request))?;
        info!(
            "✅ PersonDirectory: enrolled {} (#{}, {} sample(s))",
            response.name, response.person_id, response.samples
        );
        Ok(response)
    }

    /// 同上，直接传图片文件内容
    #[frb(dart_async)]
    pub fn enroll_files(
        &self,
        name: String,
        files: Vec<Vec<u8>>,
        notes: Option<String>,
    ) -> Result<EnrollResponse, ApiError> {
        let images = files
            .iter()
            .map(|bytes| image_data_url(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        self.enroll(name, images, notes)
    }

    #[frb(dart_async)]
    pub fn list_persons(&self, limit: Option<u32>, offset: Option<u32>) -> Result<PersonsResponse, ApiError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0);
        Ok(self
            .runtime
            .block_on(self.client.list_persons(limit, offset))?)
    }

    #[frb(dart_async)]
    pub fn delete_person(&self, person_id: i64) -> Result<DeleteResponse, ApiError> {
        let response = self.runtime.block_on(self.client.delete_person(person_id))?;
        info!("🗑️ PersonDirectory: person #{} deleted={}", person_id, response.deleted);
        Ok(response)
    }

    #[frb(dart_async)]
    pub fn health(&self) -> Result<HealthResponse, ApiError> {
        Ok(self.runtime.block_on(self.client.health())?)
    }
}

fn enroll_request(
    name: String,
    images: Vec<String>,
    notes: Option<String>,
) -> Result<EnrollRequest, ApiError> {
    let name = name.trim().to_string();
    let images: Vec<String> = images.into_iter().filter(|i| !i.trim().is_empty()).collect();
    if name.is_empty() || images.is_empty() {
        return Err(ApiError::invalid_input(
            "Name and at least one image are required",
        ));
    }
    Ok(EnrollRequest {
        name,
        images,
        notes: notes.filter(|n| !n.trim().is_empty()),
    })
}

fn image_data_url(bytes: &[u8]) -> Result<String, ApiError> {
    let mime = match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::Bmp) => "image/bmp",
        Ok(image::ImageFormat::WebP) => "image/webp",
        _ => return Err(ApiError::invalid_input("unsupported image file")),
    };
    Ok(to_data_url(mime, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enroll_requires_name_and_image() {
        let err = enroll_request("  ".into(), vec!["data:image/png;base64,AA".into()], None).unwrap_err();
        assert_eq!(err.error_type, "InvalidInput");
        assert_eq!(err.message, "Name and at least one image are required");

        assert!(enroll_request("Ada".into(), vec![], None).is_err());
        assert!(enroll_request("Ada".into(), vec!["".into()], None).is_err());
    }

    #[test]
    fn test_enroll_request_trims_and_drops_blank_notes() {
        let request = enroll_request(
            " Ada ".into(),
            vec!["data:image/png;base64,AA".into()],
            Some("  ".into()),
        )
        .unwrap();
        assert_eq!(request.name, "Ada");
        assert!(request.notes.is_none());

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("notes").is_none());
    }

    #[test]
    fn test_image_data_url_sniffs_format() {
        let png_magic = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        let url = image_data_url(&png_magic).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));

        assert!(image_data_url(b"plain text").is_err());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = PersonDirectory::create(Some("localhost:8000".into())).err().unwrap();
        assert_eq!(err.error_type, "ConfigError");
    }
}
