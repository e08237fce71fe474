//! Typed proxies for Kurento-style media server objects.
//!
//! Every proxy is a thin handle holding a remote object id and the shared
//! [`RpcTransport`](kurento_rpc::RpcTransport). Operations map one-to-one to
//! `invoke` calls and event helpers map to `subscribe`.
//!
//! # Example
//!
//! ```no_run
//! use kurento_media::{
//!     IceCandidate, KurentoClient, MediaElement, MediaObject, PlayerEndpoint, SdpEndpoint,
//!     WebRtcEndpoint,
//! };
//! use kurento_rpc::Event;
//!
//! async fn example(sdp_offer: &str) -> Result<String, Box<dyn std::error::Error>> {
//!     let client = KurentoClient::connect("ws://localhost:8888/kurento").await?;
//!     let pipeline = client.create_pipeline().await?;
//!
//!     let player = PlayerEndpoint::create(&pipeline, "http://example.com/video.webm").await?;
//!     let webrtc = WebRtcEndpoint::create(&pipeline).await?;
//!     player.connect(&webrtc).await?;
//!
//!     webrtc
//!         .on_ice_candidate_found(|event: Event| {
//!             if let Ok(candidate) = IceCandidate::from_event(&event) {
//!                 println!("local candidate: {}", candidate.candidate);
//!             }
//!         })
//!         .await?;
//!
//!     let answer = webrtc.process_offer(sdp_offer).await?;
//!     webrtc.gather_candidates().await?;
//!     player.play().await?;
//!
//!     pipeline.release().await?;
//!     Ok(answer)
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod element;
mod endpoints;
mod error;
mod filters;
mod hubs;
mod ice;
mod object;
mod pipeline;
mod types;

pub use client::KurentoClient;
pub use element::{HttpEndpoint, MediaElement, SdpEndpoint, SessionEndpoint, UriEndpoint};
pub use endpoints::{
    HttpGetEndpoint, HttpPostEndpoint, PlayerEndpoint, RecorderEndpoint, RtpEndpoint,
    WebRtcEndpoint,
};
pub use error::{Error, Result};
pub use filters::{FaceOverlayFilter, GStreamerFilter, ZBarFilter};
pub use hubs::{Composite, Dispatcher, DispatcherOneToMany};
pub use ice::IceCandidate;
pub use object::{MediaObject, RemoteType};
pub use pipeline::MediaPipeline;
pub use types::MediaType;
