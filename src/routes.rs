use bytes::Bytes;
use poem::middleware::Tracing;
use poem::{Endpoint, EndpointExt, Result, Route};
use poem_openapi::param::Path;
use poem_openapi::payload::Json;
use poem_openapi::types::multipart::Upload;
use poem_openapi::{Multipart, OpenApi, OpenApiService};

use crate::auth::TokenAuth;
use crate::controller::{FaceclaimController, FaceclaimRequest};
use crate::error::ApiError;

#[derive(Multipart, Debug)]
pub struct LogUpload {
    /// The log file, stored under its own filename.
    log_file: Upload,
}

pub struct FaceclaimApi {
    controller: FaceclaimController,
}

impl FaceclaimApi {
    pub fn new(controller: FaceclaimController) -> Self {
        Self { controller }
    }
}

#[OpenApi]
impl FaceclaimApi {
    /// Upload Faceclaim
    ///
    /// Fetch the image at `image_url`, convert it to WebP and store it under
    /// the character's prefix. Responds with the public URL of the stored image.
    #[oai(path = "/faceclaim/upload", method = "post")]
    async fn upload_faceclaim(&self, payload: Json<FaceclaimRequest>) -> Result<Json<String>> {
        let url = self.controller.upload_faceclaim(&payload.0).await?;
        Ok(Json(url))
    }

    /// Delete Character Faceclaims
    ///
    /// Queue the deletion of every faceclaim belonging to a character.
    #[oai(path = "/faceclaim/delete/:charid/all", method = "delete")]
    async fn delete_character_faceclaims(&self, charid: Path<String>) -> Result<()> {
        self.controller.delete_all(&charid.0).await?;
        Ok(())
    }

    /// Delete Faceclaim
    ///
    /// Queue the deletion of a single faceclaim.
    #[oai(path = "/faceclaim/delete/:charid/:image", method = "delete")]
    async fn delete_single_faceclaim(
        &self,
        charid: Path<String>,
        image: Path<String>,
    ) -> Result<()> {
        self.controller.delete_one(&charid.0, &image.0).await?;
        Ok(())
    }

    /// Upload Log
    ///
    /// Store a log file, overwriting any existing log with the same name.
    #[oai(path = "/upload_log", method = "post")]
    async fn upload_log(&self, upload: LogUpload) -> Result<()> {
        let filename = upload
            .log_file
            .file_name()
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| ApiError::Validation("log_file is missing a filename".into()))?;

        let data = upload
            .log_file
            .into_vec()
            .await
            .map_err(|e| ApiError::Validation(format!("failed to read log_file: {}", e)))?;

        self.controller.upload_log(&filename, Bytes::from(data)).await?;
        Ok(())
    }
}

/// Builds the full route tree, every route sits behind the auth gate.
pub fn build_app(controller: FaceclaimController, token: &str) -> impl Endpoint {
    let api = OpenApiService::new(
        FaceclaimApi::new(controller),
        "Faceclaims API",
        env!("CARGO_PKG_VERSION"),
    );

    let docs = api.redoc();
    let spec = api.spec_endpoint();

    Route::new()
        .nest("/docs", docs)
        .at("/openapi.json", spec)
        .nest("/", api)
        .with(TokenAuth::new(token))
        .with(Tracing)
}
