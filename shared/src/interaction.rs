use std::time::Duration;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    errors::RequestError,
    hash,
    types::{Assignment, Candidate, NonceRange, WorkerId},
};

/// coordinator -> worker
///
/// `nonce_range_end` is inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRequest {
    pub block: String,
    pub target: String,
    pub nonce_range_start: u64,
    pub nonce_range_end: u64,
    pub request_id: String,
    /// milliseconds the worker may spend before giving up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_time: Option<u64>,
}

impl WorkRequest {
    pub fn from_assignment(assignment: &Assignment, work_time: Option<Duration>) -> Self {
        let work = &assignment.work_unit;
        Self {
            block: work.block.clone(),
            target: hash::to_hex(&work.target),
            nonce_range_start: assignment.range.start,
            nonce_range_end: assignment.range.end,
            request_id: work.request_id.clone(),
            work_time: work_time.map(|t| t.as_millis() as u64),
        }
    }

    pub fn range(&self) -> Result<NonceRange, RequestError> {
        if self.nonce_range_end < self.nonce_range_start {
            return Err(RequestError::InvalidRange {
                start: self.nonce_range_start,
                end: self.nonce_range_end,
            });
        }
        Ok(NonceRange::new(self.nonce_range_start, self.nonce_range_end))
    }

    pub fn target(&self) -> Result<U256, RequestError> {
        Ok(hash::parse_hex(&self.target)?)
    }
}

/// worker -> coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkResponse {
    Solution { request_id: String, block_hash: String, nonce: u64 },
    NoSolution { request_id: String, no_solution: bool },
}

impl WorkResponse {
    pub fn new(request_id: String, candidate: Option<&Candidate>) -> Self {
        match candidate {
            Some(candidate) => WorkResponse::Solution {
                request_id,
                block_hash: hash::to_hex(&candidate.hash),
                nonce: candidate.nonce,
            },
            None => WorkResponse::NoSolution { request_id, no_solution: true },
        }
    }
}

/// A raw worker reply mapped onto the shapes the coordinator understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerReply {
    Candidate(Candidate),
    NoSolution,
    Malformed(String),
}

impl WorkerReply {
    /// Validate the structure of `value`. The hash itself is not checked
    /// against the block here.
    pub fn from_value(value: &Value, request_id: &str, worker_id: &WorkerId) -> Self {
        let Some(object) = value.as_object() else {
            return WorkerReply::Malformed("reply is not an object".to_string());
        };

        if let Some(id) = object.get("request_id") {
            match id.as_str() {
                Some(id) if id == request_id => {}
                Some(id) => return WorkerReply::Malformed(format!("stale request id `{id}`")),
                None => return WorkerReply::Malformed("request_id is not a string".to_string()),
            }
        }

        match (object.get("block_hash"), object.get("nonce")) {
            (Some(block_hash), Some(nonce)) => {
                let Some(block_hash) = block_hash.as_str() else {
                    return WorkerReply::Malformed("block_hash is not a string".to_string());
                };
                let Some(nonce) = nonce.as_u64() else {
                    return WorkerReply::Malformed("nonce is not an unsigned integer".to_string());
                };
                match hash::parse_hex(block_hash) {
                    Ok(hash) => WorkerReply::Candidate(Candidate {
                        worker_id: worker_id.clone(),
                        nonce,
                        hash,
                    }),
                    Err(err) => WorkerReply::Malformed(format!("block_hash: {err}")),
                }
            }
            (None, None) => {
                if object.get("no_solution").and_then(Value::as_bool) == Some(true) {
                    WorkerReply::NoSolution
                } else {
                    WorkerReply::Malformed("neither block_hash nor nonce present".to_string())
                }
            }
            (Some(_), None) => WorkerReply::Malformed("missing nonce".to_string()),
            (None, Some(_)) => WorkerReply::Malformed("missing block_hash".to_string()),
        }
    }
}

/// Payload forwarded to the upstream submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionSubmission {
    pub request_id: String,
    pub block: String,
    pub block_hash: String,
    pub nonce: u64,
    pub worker_id: WorkerId,
}

impl SolutionSubmission {
    pub fn new(request_id: &str, block: &str, candidate: &Candidate) -> Self {
        Self {
            request_id: request_id.to_string(),
            block: block.to_string(),
            block_hash: hash::to_hex(&candidate.hash),
            nonce: candidate.nonce,
            worker_id: candidate.worker_id.clone(),
        }
    }
}

// restful api

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RestfulResponse<T> {
    pub code: i32,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> RestfulResponse<T> {
    pub fn success(data: T) -> Self {
        RestfulResponse { code: 200, data: Some(data), message: None }
    }

    pub fn error(message: String, code: i32) -> Self {
        RestfulResponse { code, data: None, message: Some(message) }
    }
}

#[derive(Debug, Error)]
pub enum RestfulError {
    #[error("no round has completed yet")]
    RoundNotFound,
    #[error("Internal Server Error")]
    InternalServerError,
}

impl RestfulError {
    fn get_code(&self) -> i32 {
        match self {
            RestfulError::RoundNotFound => -10001,
            RestfulError::InternalServerError => -30000,
        }
    }
}

impl ResponseError for RestfulError {
    fn status_code(&self) -> StatusCode {
        match self {
            RestfulError::RoundNotFound => StatusCode::NOT_FOUND,
            RestfulError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let code = self.get_code();
        let error = self.to_string();
        match self {
            RestfulError::RoundNotFound => {
                HttpResponse::NotFound().json(RestfulResponse::<()>::error(error, code))
            }
            RestfulError::InternalServerError => {
                HttpResponse::InternalServerError().json(RestfulResponse::<()>::error(error, code))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::WorkUnit;

    fn worker() -> WorkerId {
        WorkerId::from("w-1")
    }

    #[test]
    fn request_carries_inclusive_range_and_hex_target() {
        let assignment = Assignment {
            work_unit: WorkUnit {
                block: "abc".into(),
                target: U256::from(0xffu64),
                request_id: "r-1".into(),
                issued_at: 0,
                range: NonceRange::new(0, 99),
            },
            range: NonceRange::new(50, 99),
            worker_id: worker(),
        };
        let request = WorkRequest::from_assignment(&assignment, Some(Duration::from_secs(8)));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "block": "abc",
                "target": format!("{:0>64}", "ff"),
                "nonce_range_start": 50,
                "nonce_range_end": 99,
                "request_id": "r-1",
                "work_time": 8000,
            })
        );
        assert_eq!(request.range().unwrap(), NonceRange::new(50, 99));
        assert_eq!(request.target().unwrap(), U256::from(0xffu64));
    }

    #[test]
    fn request_without_work_time_parses() {
        let request: WorkRequest = serde_json::from_value(json!({
            "block": "abc",
            "target": "0x10",
            "nonce_range_start": 5,
            "nonce_range_end": 4,
            "request_id": "r",
        }))
        .unwrap();
        assert_eq!(request.work_time, None);
        assert!(matches!(request.range(), Err(RequestError::InvalidRange { start: 5, end: 4 })));
    }

    #[test]
    fn candidate_reply() {
        let hx = hash::compute("abc", 7);
        let value = serde_json::to_value(WorkResponse::new(
            "r".into(),
            Some(&Candidate { worker_id: worker(), nonce: 7, hash: hx }),
        ))
        .unwrap();
        assert_eq!(
            WorkerReply::from_value(&value, "r", &worker()),
            WorkerReply::Candidate(Candidate { worker_id: worker(), nonce: 7, hash: hx })
        );
    }

    #[test]
    fn no_solution_reply() {
        let value = serde_json::to_value(WorkResponse::new("r".into(), None)).unwrap();
        assert_eq!(value, json!({"request_id": "r", "no_solution": true}));
        assert_eq!(WorkerReply::from_value(&value, "r", &worker()), WorkerReply::NoSolution);
    }

    #[test]
    fn reply_without_request_id_is_accepted() {
        let value = json!({"block_hash": "00ff", "nonce": 3});
        assert!(matches!(
            WorkerReply::from_value(&value, "r", &worker()),
            WorkerReply::Candidate(Candidate { nonce: 3, .. })
        ));
    }

    #[test]
    fn malformed_replies() {
        let cases = [
            json!(null),
            json!([1, 2]),
            json!({}),
            json!({"request_id": "r"}),
            json!({"request_id": "old", "no_solution": true}),
            json!({"request_id": 5, "no_solution": true}),
            json!({"block_hash": "00ff"}),
            json!({"nonce": 3}),
            json!({"block_hash": 12, "nonce": 3}),
            json!({"block_hash": "00ff", "nonce": -3}),
            json!({"block_hash": "00ff", "nonce": "3"}),
            json!({"block_hash": "zz", "nonce": 3}),
            json!({"no_solution": false}),
        ];
        for value in cases {
            assert!(
                matches!(WorkerReply::from_value(&value, "r", &worker()), WorkerReply::Malformed(_)),
                "{value} should be malformed"
            );
        }
    }

    #[test]
    fn submission_payload() {
        let hx = hash::compute("abc", 1);
        let submission = SolutionSubmission::new(
            "r",
            "abc",
            &Candidate { worker_id: worker(), nonce: 1, hash: hx },
        );
        let value = serde_json::to_value(&submission).unwrap();
        assert_eq!(value["block_hash"], json!(hash::to_hex(&hx)));
        assert_eq!(value["worker_id"], json!("w-1"));
        assert_eq!(value["nonce"], json!(1));
    }
}
