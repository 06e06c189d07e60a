use super::peer::{CallerIdentity, PeerIdentityExtractor};
use crate::credential::WorkloadCredentials;
use crate::prelude::{debug, warn};
use crate::proto::workload_service_server::WorkloadService;
use crate::proto::{CheckRequest, CheckResponse, RpcStatus};
use std::sync::Arc;
use tonic::{Code, Request, Response, Status};

const PERMISSION_DENIED_MESSAGE: &str = "Not able to get credentials";

/// `WorkloadService` bound to a single workload's socket.
pub(super) struct WorkloadCheckService {
    pub(super) creds: Arc<WorkloadCredentials>,
    pub(super) extractor: Arc<dyn PeerIdentityExtractor>,
}

/// Answers a check for the workload owning the socket.
///
/// The denial message is fixed and never names the service account.
pub(super) fn check_response(
    creds: &WorkloadCredentials,
    caller: Option<&CallerIdentity>,
) -> CheckResponse {
    let status = match caller {
        None => {
            warn!("Check denied: uid={}, reason=unresolved caller", creds.uid);
            RpcStatus {
                code: Code::PermissionDenied as i32,
                message: PERMISSION_DENIED_MESSAGE.to_string(),
            }
        }
        Some(caller) => {
            debug!("Check allowed: uid={}, caller={caller}", creds.uid);
            RpcStatus {
                code: Code::Ok as i32,
                message: format!(
                    "all good to workload with service account {}",
                    creds.service_account
                ),
            }
        }
    };
    CheckResponse {
        status: Some(status),
    }
}

#[tonic::async_trait]
impl WorkloadService for WorkloadCheckService {
    async fn check(
        &self,
        request: Request<CheckRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        let caller = self.extractor.caller(request.extensions());
        debug!(
            "Check called: uid={}, name={}",
            self.creds.uid,
            request.get_ref().name
        );
        Ok(Response::new(check_response(&self.creds, caller.as_ref())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> WorkloadCredentials {
        WorkloadCredentials {
            uid: "uid-1".into(),
            name: "reviews".into(),
            namespace: "default".into(),
            service_account: "reviews-sa".into(),
        }
    }

    #[test]
    fn test_unresolved_caller_is_denied_without_leaking_account() {
        let status = check_response(&creds(), None).status.unwrap();
        assert_eq!(status.code, Code::PermissionDenied as i32);
        assert_eq!(status.code, 7);
        assert!(!status.message.contains("reviews-sa"));
    }

    #[test]
    fn test_resolved_caller_is_ok() {
        let caller = CallerIdentity {
            uid: 1000,
            gid: 1000,
            pid: None,
        };
        let status = check_response(&creds(), Some(&caller)).status.unwrap();
        assert_eq!(status.code, 0);
        assert_eq!(
            status.message,
            "all good to workload with service account reviews-sa"
        );
    }
}
