use crate::api::{
    ApiResult,
    DrawingImage,
    GameSnapshot,
    PortalApi,
    PortalError,
    SessionToken,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    Serialize,
};

/// reqwest-backed client for the portal backend.
#[derive(Clone)]
pub struct PortalClient {
    base_url: String,
    http: reqwest::Client,
}

impl PortalClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client for portal backend")?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn read_success(res: reqwest::Response) -> ApiResult<Vec<u8>> {
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| PortalError::Transport(format!("failed to read body: {e}")))?;
        if status.is_success() {
            return Ok(bytes.to_vec());
        }
        let body = String::from_utf8_lossy(&bytes);
        Err(classify_failure(status, &body))
    }
}

fn transport(err: reqwest::Error) -> PortalError {
    PortalError::Transport(err.to_string())
}

fn decode<T: for<'de> Deserialize<'de>>(body: &[u8], what: &str) -> ApiResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| PortalError::Decode(format!("invalid {what} payload: {e}")))
}

/// Maps a non-2xx response onto the error taxonomy.
///
/// The backend answers a wrong passphrase with 403 as well, so a 403 whose
/// detail talks about the passphrase is a rejection, not a dead session.
pub fn classify_failure(status: StatusCode, body: &str) -> PortalError {
    let detail = serde_json::from_str::<ErrorDto>(body)
        .ok()
        .and_then(|dto| dto.detail)
        .unwrap_or_else(|| body.trim().to_string());
    match status {
        StatusCode::UNAUTHORIZED => PortalError::Unauthorized {
            status: status.as_u16(),
        },
        StatusCode::FORBIDDEN if !detail.to_lowercase().contains("passphrase") => {
            PortalError::Unauthorized {
                status: status.as_u16(),
            }
        }
        _ => PortalError::Rejected {
            status: status.as_u16(),
            detail,
        },
    }
}

impl PortalApi for PortalClient {
    async fn enter(&self) -> ApiResult<SessionToken> {
        let res = self
            .http
            .post(self.url("enter"))
            .send()
            .await
            .map_err(transport)?;
        let body = Self::read_success(res).await?;
        let dto: EnterDto = decode(&body, "enter")?;
        SessionToken::new(dto.portal_token)
            .ok_or_else(|| PortalError::Decode("backend minted an empty token".to_string()))
    }

    async fn fetch_state(&self, token: &SessionToken) -> ApiResult<GameSnapshot> {
        let res = self
            .http
            .get(self.url("data"))
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(transport)?;
        let body = Self::read_success(res).await?;
        decode(&body, "game state")
    }

    async fn submit_drawing(
        &self,
        token: &SessionToken,
        image: &DrawingImage,
    ) -> ApiResult<String> {
        let req = DrawingDto {
            image_data: image.data_url(),
        };
        let res = self
            .http
            .post(self.url("chatbot"))
            .bearer_auth(token.as_str())
            .json(&req)
            .send()
            .await
            .map_err(transport)?;
        let body = Self::read_success(res).await?;
        let dto: GuardianReplyDto = decode(&body, "guardian reply")?;
        Ok(dto.response)
    }

    async fn unlock(&self, token: &SessionToken, passphrase: &str) -> ApiResult<()> {
        let req = UnlockDto {
            passphrase: passphrase.to_string(),
        };
        let res = self
            .http
            .post(self.url("unlock"))
            .bearer_auth(token.as_str())
            .json(&req)
            .send()
            .await
            .map_err(transport)?;
        Self::read_success(res).await.map(|_| ())
    }

    async fn health(&self) -> ApiResult<()> {
        let res = self
            .http
            .get(self.url("health"))
            .send()
            .await
            .map_err(transport)?;
        Self::read_success(res).await.map(|_| ())
    }
}

#[derive(Deserialize)]
struct EnterDto {
    #[serde(rename = "portalToken")]
    portal_token: String,
}

#[derive(Serialize)]
struct DrawingDto {
    image_data: String,
}

#[derive(Deserialize)]
struct GuardianReplyDto {
    #[serde(alias = "message")]
    response: String,
}

#[derive(Serialize)]
struct UnlockDto {
    passphrase: String,
}

#[derive(Deserialize)]
struct ErrorDto {
    detail: Option<String>,
}
