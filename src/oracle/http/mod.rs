// Padding oracle reached over HTTP: GET <endpoint>?ciphertext=<hex>
pub mod server;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use tracing::trace;

use crate::ciphertext::Ciphertext;
use crate::error::OracleError;

use super::{PaddingOracle, Verdict};

pub const ORACLE_PATH: &str = "/oracle";

/// Maps the status code of an oracle response to its verdict.
pub fn verdict_from_status(status: StatusCode) -> Option<Verdict> {
    match status {
        StatusCode::OK => Some(Verdict::Ok),
        StatusCode::FORBIDDEN => Some(Verdict::PaddingInvalid),
        StatusCode::UNAUTHORIZED => Some(Verdict::MacInvalid),
        _ => None,
    }
}

pub fn status_for_verdict(verdict: Verdict) -> StatusCode {
    match verdict {
        Verdict::Ok => StatusCode::OK,
        Verdict::PaddingInvalid => StatusCode::FORBIDDEN,
        Verdict::MacInvalid => StatusCode::UNAUTHORIZED,
    }
}

/// Blocking client for an oracle served by [`server::spawn_server`].
///
/// Must not be constructed or queried from inside an async runtime.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: Client,
    endpoint: String,
}

impl HttpOracle {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:9000`.
    pub fn new(base_url: &str) -> Result<Self, OracleError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), ORACLE_PATH),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PaddingOracle for HttpOracle {
    fn query(&self, ciphertext: &Ciphertext) -> Result<Verdict, OracleError> {
        let uri = format!("{}?ciphertext={}", self.endpoint, ciphertext.to_hex());
        let response = self.client.get(&uri).send()?;
        let status = response.status();
        match verdict_from_status(status) {
            Some(verdict) => {
                trace!(%status, ?verdict, "http oracle verdict");
                Ok(verdict)
            }
            None => Err(OracleError::UnexpectedStatus {
                status: status.as_u16(),
                body: response.text()?,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{rngs::StdRng, SeedableRng};
    use rstest::rstest;
    use tokio::runtime::Runtime;

    use crate::attack::BlockDecryptionAttack;
    use crate::ciphertext::BLOCK_SIZE;
    use crate::error::AttackError;
    use crate::oracle::reference::MacPrefixOracle;

    // The blocking client cannot run inside the server's runtime, so each test
    // keeps its own runtime alive and drives the client from the test thread.
    fn serve<O: PaddingOracle + Send + 'static>(oracle: O) -> (Runtime, String) {
        let runtime = Runtime::new().unwrap();
        let url = runtime
            .block_on(server::spawn_server("127.0.0.1:0", oracle))
            .unwrap();
        (runtime, url)
    }

    #[rstest]
    #[case(Verdict::Ok)]
    #[case(Verdict::PaddingInvalid)]
    #[case(Verdict::MacInvalid)]
    fn status_codes_map_back_to_verdicts(#[case] verdict: Verdict) {
        assert_eq!(
            verdict_from_status(status_for_verdict(verdict)),
            Some(verdict)
        );
    }

    #[test]
    fn other_status_codes_are_not_verdicts() {
        assert_eq!(verdict_from_status(StatusCode::BAD_REQUEST), None);
        assert_eq!(verdict_from_status(StatusCode::BAD_GATEWAY), None);
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let oracle = HttpOracle::new("http://127.0.0.1:9000/").unwrap();

        assert_eq!(oracle.endpoint(), "http://127.0.0.1:9000/oracle");
    }

    #[test]
    fn block_is_decrypted_through_http_oracle() {
        let mut rng = StdRng::seed_from_u64(101);
        let reference = MacPrefixOracle::from_rng(&mut rng);
        let ciphertext = reference.seal(b"YELLOW SUBMARINE", &[0x42; BLOCK_SIZE]);
        let (_runtime, url) = serve(reference);
        let oracle = HttpOracle::new(&url).unwrap();

        // Dropping the padding block leaves the message block last.
        let truncated = ciphertext.truncated(4);
        let plaintext = BlockDecryptionAttack::new(&oracle, &truncated, 3)
            .decrypt()
            .unwrap();

        assert_eq!(&plaintext, b"YELLOW SUBMARINE");
    }

    #[test]
    fn server_side_oracle_failure_is_unexpected_status() {
        let failing = |_: &Ciphertext| -> Result<Verdict, OracleError> {
            Err(OracleError::Unavailable("backend down".to_string()))
        };
        let (_runtime, url) = serve(failing);
        let oracle = HttpOracle::new(&url).unwrap();

        let result = oracle.query(&Ciphertext::new(vec![0u8; 2 * BLOCK_SIZE]));

        assert!(matches!(
            result,
            Err(OracleError::UnexpectedStatus { status: 502, body }) if body.contains("backend down")
        ));
    }

    #[test]
    fn unreachable_server_fails_attack_with_transport_error() {
        // Bind then drop a listener to find a port nobody is serving.
        let address = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let oracle = HttpOracle::new(&format!("http://{}", address)).unwrap();
        let ciphertext = Ciphertext::new(vec![0u8; 2 * BLOCK_SIZE]);

        let result = BlockDecryptionAttack::new(&oracle, &ciphertext, 1).decrypt();

        assert!(matches!(
            result,
            Err(AttackError::Oracle(OracleError::Transport(_)))
        ));
    }
}
