// gRPC surface of the Sky API.
//
// A handful of camera operations go over a single TLS gRPC endpoint with
// the access token in `("token", ...)` metadata. The channel lives only
// for the duration of one call. Messages are written by hand with prost
// derives; there is no build-time codegen for four unary calls.

use http::uri::PathAndQuery;
use tonic::codec::ProstCodec;
use tonic::transport::{Channel, ClientTlsConfig};

use crate::client::SkyClient;
use crate::error::Error;

#[derive(Clone, PartialEq, prost::Message)]
pub struct RebootCameraRequest {
    #[prost(int64, tag = "1")]
    pub panel_id: i64,
    #[prost(int64, tag = "2")]
    pub device_id: i64,
    #[prost(string, tag = "3")]
    pub device_type: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SetCameraPrivacyModeRequest {
    #[prost(int64, tag = "1")]
    pub panel_id: i64,
    #[prost(int64, tag = "2")]
    pub device_id: i64,
    #[prost(bool, tag = "3")]
    pub privacy_mode: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SetDeterOverrideRequest {
    #[prost(int64, tag = "1")]
    pub panel_id: i64,
    #[prost(int64, tag = "2")]
    pub device_id: i64,
    #[prost(bool, tag = "3")]
    pub enabled: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SetUseAsDoorbellChimeExtenderRequest {
    #[prost(int64, tag = "1")]
    pub panel_id: i64,
    #[prost(int64, tag = "2")]
    pub device_id: i64,
    #[prost(bool, tag = "3")]
    pub use_as_doorbell_chime_extender: bool,
}

/// All four calls answer with an empty message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct BeamReply {}

impl SkyClient {
    /// Reboot a camera.
    pub async fn reboot_camera(
        &self,
        panel_id: i64,
        device_id: i64,
        device_type: &str,
    ) -> Result<(), Error> {
        let request = RebootCameraRequest {
            panel_id,
            device_id,
            device_type: device_type.to_owned(),
        };
        self.grpc_unary::<_, BeamReply>("/beam.Beam/RebootCamera", request)
            .await?;
        Ok(())
    }

    /// Toggle a camera's privacy mode.
    pub async fn set_camera_privacy_mode(
        &self,
        panel_id: i64,
        device_id: i64,
        privacy_mode: bool,
    ) -> Result<(), Error> {
        let request = SetCameraPrivacyModeRequest {
            panel_id,
            device_id,
            privacy_mode,
        };
        self.grpc_unary::<_, BeamReply>("/beam.Beam/SetCameraPrivacyMode", request)
            .await?;
        Ok(())
    }

    /// Toggle a camera's deter mode.
    pub async fn set_camera_deter_mode(
        &self,
        panel_id: i64,
        device_id: i64,
        enabled: bool,
    ) -> Result<(), Error> {
        let request = SetDeterOverrideRequest {
            panel_id,
            device_id,
            enabled,
        };
        self.grpc_unary::<_, BeamReply>("/beam.Beam/SetDeterOverride", request)
            .await?;
        Ok(())
    }

    /// Use a camera as a doorbell chime extender.
    pub async fn set_camera_as_doorbell_chime_extender(
        &self,
        panel_id: i64,
        device_id: i64,
        state: bool,
    ) -> Result<(), Error> {
        let request = SetUseAsDoorbellChimeExtenderRequest {
            panel_id,
            device_id,
            use_as_doorbell_chime_extender: state,
        };
        self.grpc_unary::<_, BeamReply>("/beam.Beam/SetUseAsDoorbellChimeExtender", request)
            .await?;
        Ok(())
    }

    /// One unary call over a fresh TLS channel with token metadata.
    async fn grpc_unary<Req, Resp>(
        &self,
        path: &'static str,
        message: Req,
    ) -> Result<Resp, Error>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        if !self.is_session_valid() {
            self.ensure_session().await?;
        }
        let access = self.access_token().ok_or_else(|| Error::Authentication {
            message: "no access token for gRPC call".into(),
        })?;

        let tls = ClientTlsConfig::new().with_native_roots();
        let channel = Channel::from_shared(self.endpoints().grpc.clone())
            .map_err(|e| Error::Grpc(format!("invalid gRPC endpoint: {e}")))?
            .tls_config(tls)
            .map_err(|e| Error::Grpc(format!("TLS config: {e}")))?
            .connect()
            .await
            .map_err(|e| Error::Grpc(format!("connect: {e}")))?;

        let mut grpc = tonic::client::Grpc::new(channel);
        grpc.ready()
            .await
            .map_err(|e| Error::Grpc(format!("channel not ready: {e}")))?;

        let mut request = tonic::Request::new(message);
        let token = access
            .parse()
            .map_err(|_| Error::Grpc("access token is not valid metadata".into()))?;
        request.metadata_mut().insert("token", token);

        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let response = grpc
            .unary(request, PathAndQuery::from_static(path), codec)
            .await
            .map_err(|status| Error::Grpc(status.to_string()))?;

        Ok(response.into_inner())
    }
}
