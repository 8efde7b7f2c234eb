/// Keyspace builder for import object paths.
///
/// Every job lives under `{prefix}/cxid={cx_id}/jobid={job_id}/`.
#[derive(Debug, Clone)]
pub struct ImportKeyspace {
    base_prefix: Option<String>,
}

impl Default for ImportKeyspace {
    fn default() -> Self {
        Self::new(Some(DEFAULT_PREFIX.to_string()))
    }
}

/// Default root prefix for import objects.
pub const DEFAULT_PREFIX: &str = "patient-import";

impl ImportKeyspace {
    pub fn new(base_prefix: Option<String>) -> Self {
        let base_prefix = base_prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        Self { base_prefix }
    }

    pub fn raw_upload_key(&self, cx_id: &str, job_id: &str) -> String {
        self.job_key(cx_id, job_id, &["raw", "upload.csv"])
    }

    pub fn record_key(&self, cx_id: &str, job_id: &str, row_number: u32) -> String {
        self.job_key(
            cx_id,
            job_id,
            &["records", &format!("row-{}.json", row_number)],
        )
    }

    pub fn records_prefix(&self, cx_id: &str, job_id: &str) -> String {
        self.job_key(cx_id, job_id, &["records/"])
    }

    pub fn staged_patient_key(&self, cx_id: &str, job_id: &str, row_number: u32) -> String {
        self.job_key(
            cx_id,
            job_id,
            &["patients", &format!("row-{}.json", row_number)],
        )
    }

    pub fn valid_rows_key(&self, cx_id: &str, job_id: &str) -> String {
        self.job_key(cx_id, job_id, &["validation", "valid.csv"])
    }

    pub fn invalid_rows_key(&self, cx_id: &str, job_id: &str) -> String {
        self.job_key(cx_id, job_id, &["validation", "invalid.csv"])
    }

    pub fn result_key(&self, cx_id: &str, job_id: &str) -> String {
        self.job_key(cx_id, job_id, &["result", "result.csv"])
    }

    pub fn job_prefix(&self, cx_id: &str, job_id: &str) -> String {
        self.job_key(cx_id, job_id, &["/"])
    }

    fn job_key(&self, cx_id: &str, job_id: &str, rest: &[&str]) -> String {
        let cx = format!("cxid={}", sanitize(cx_id));
        let job = format!("jobid={}", sanitize(job_id));
        let mut parts: Vec<&str> = vec![&cx, &job];
        parts.extend_from_slice(rest);
        self.join(&parts)
    }

    fn join(&self, parts: &[&str]) -> String {
        let mut segs: Vec<String> = Vec::new();
        if let Some(prefix) = &self.base_prefix {
            segs.push(prefix.clone());
        }

        for part in parts {
            let trimmed = part.trim_matches('/');
            if trimmed.is_empty() {
                continue;
            }
            segs.push(trimmed.to_string());
        }

        let mut out = segs.join("/");
        if parts.last().map(|p| p.ends_with('/')).unwrap_or(false) && !out.ends_with('/') {
            out.push('/');
        }
        out
    }
}

/// Extracts the row number from a record key ending in `row-{n}.json`.
pub fn row_number_from_record_key(key: &str) -> Option<u32> {
    key.rsplit('/')
        .next()?
        .strip_prefix("row-")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ' ' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_scoped_keys() {
        let keys = ImportKeyspace::default();
        assert_eq!(
            keys.raw_upload_key("cx-1", "job-1"),
            "patient-import/cxid=cx-1/jobid=job-1/raw/upload.csv"
        );
        assert_eq!(
            keys.record_key("cx-1", "job-1", 7),
            "patient-import/cxid=cx-1/jobid=job-1/records/row-7.json"
        );
        assert_eq!(
            keys.records_prefix("cx-1", "job-1"),
            "patient-import/cxid=cx-1/jobid=job-1/records/"
        );
        assert_eq!(
            keys.result_key("cx-1", "job-1"),
            "patient-import/cxid=cx-1/jobid=job-1/result/result.csv"
        );
        assert_eq!(
            keys.job_prefix("cx-1", "job-1"),
            "patient-import/cxid=cx-1/jobid=job-1/"
        );
    }

    #[test]
    fn test_prefix_is_trimmed() {
        let keys = ImportKeyspace::new(Some("/imports/".to_string()));
        assert_eq!(
            keys.valid_rows_key("a", "b"),
            "imports/cxid=a/jobid=b/validation/valid.csv"
        );

        let keys = ImportKeyspace::new(None);
        assert_eq!(
            keys.invalid_rows_key("a", "b"),
            "cxid=a/jobid=b/validation/invalid.csv"
        );
    }

    #[test]
    fn test_ids_are_sanitized() {
        let keys = ImportKeyspace::new(None);
        assert_eq!(
            keys.staged_patient_key("a/b", "c d", 1),
            "cxid=a_b/jobid=c_d/patients/row-1.json"
        );
    }

    #[test]
    fn test_row_number_from_record_key() {
        let keys = ImportKeyspace::default();
        let key = keys.record_key("cx", "job", 123);
        assert_eq!(row_number_from_record_key(&key), Some(123));
        assert_eq!(row_number_from_record_key("x/records/row-.json"), None);
        assert_eq!(row_number_from_record_key("x/records/other.json"), None);
    }
}
