use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info, warn};

use crate::ciphertext::Ciphertext;
use crate::oracle::PaddingOracle;

use super::{status_for_verdict, ORACLE_PATH};

/// Serves `oracle` in the background and returns the server's base URL.
pub async fn spawn_server<O: PaddingOracle + Send + 'static>(
    address: impl ToSocketAddrs,
    oracle: O,
) -> Result<String, std::io::Error> {
    let app = router(Arc::new(oracle));
    let listener = TcpListener::bind(address).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "oracle server stopped");
        }
    });
    info!(%addr, "oracle server listening");
    Ok(format!("http://{}", addr))
}

pub fn router<O: PaddingOracle + Send + 'static>(oracle: Arc<O>) -> Router {
    Router::new()
        .route(ORACLE_PATH, get(handle_query::<O>))
        .with_state(oracle)
}

async fn handle_query<O: PaddingOracle + Send + 'static>(
    State(oracle): State<Arc<O>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let ciphertext = match params.get("ciphertext") {
        Some(hex) => match Ciphertext::from_hex(hex) {
            Ok(c) => c,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("Illegal ciphertext: {}", e))
                    .into_response()
            }
        },
        None => {
            return (StatusCode::BAD_REQUEST, "Missing 'ciphertext' parameter").into_response()
        }
    };

    // Oracles may block, e.g. when they are themselves remote.
    let result = tokio::task::spawn_blocking(move || oracle.query(&ciphertext)).await;
    match result {
        Ok(Ok(verdict)) => (status_for_verdict(verdict), format!("{:?}", verdict)).into_response(),
        Ok(Err(e)) => {
            warn!(error = %e, "oracle query failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
        Err(e) => {
            error!(error = %e, "oracle task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Oracle task failed").into_response()
        }
    }
}
