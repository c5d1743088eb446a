use crate::directive::RunDirective;
use crate::resource::ResourceRecord;

/// Which stages a resource still needs in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkPlan {
    RetrieveThenUpload,
    UploadOnly,
}

/// Decide whether a resource must be (re)processed under a directive.
///
/// Pure function, no side effects. `record` is absent for first-time
/// resources (fresh scrape output with no prior state).
pub fn plan(directive: RunDirective, record: Option<&ResourceRecord>) -> Option<WorkPlan> {
    match directive {
        // Full overwrite: any prior record is ignored.
        RunDirective::Fresh | RunDirective::Force => Some(WorkPlan::RetrieveThenUpload),

        RunDirective::Resume => match record {
            None => Some(WorkPlan::RetrieveThenUpload),
            Some(r) if !r.retrieved() => Some(WorkPlan::RetrieveThenUpload),
            Some(r) if !r.uploaded() => Some(WorkPlan::UploadOnly),
            Some(_) => None,
        },

        // Never re-attempts retrieval.
        RunDirective::ResumeUpload => match record {
            Some(r) if r.retrieved() && !r.uploaded() => Some(WorkPlan::UploadOnly),
            _ => None,
        },

        RunDirective::AnalyticsOnly => None,
    }
}
