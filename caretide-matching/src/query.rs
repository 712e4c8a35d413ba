//! Search filters and pagination
//!
//! Transport layers map query strings onto these structs 1:1; the stores
//! apply them. Page numbers are 1-based and limits are clamped to 1..=100.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BranchId, CaregiverId, ClientId, OpenShiftId, OrganizationId, ServiceTypeId};
use crate::proposal::{AssignmentProposal, ProposalMethod, ProposalStatus};
use crate::shift::{MatchingStatus, OpenShift, ShiftPriority};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Desc
    }
}

/// Page request; defaults to the first page of 20, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    /// 1-based page number
    pub page: u32,
    /// Page size, clamped to 1..=100
    pub limit: usize,
    /// Optional sort key; stores fall back to creation time
    pub sort_by: Option<String>,
    /// Sort direction
    pub sort_order: SortOrder,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            sort_by: None,
            sort_order: SortOrder::Desc,
        }
    }
}

impl Pagination {
    /// Clamp out-of-range values into the accepted ranges
    pub fn normalized(&self) -> Pagination {
        Pagination {
            page: self.page.max(1),
            limit: self.limit.clamp(1, 100),
            sort_by: self.sort_by.clone(),
            sort_order: self.sort_order,
        }
    }

    /// Item offset of the page start
    pub fn offset(&self) -> usize {
        let normalized = self.normalized();
        (normalized.page as usize - 1) * normalized.limit
    }
}

/// One page of results with the total row count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    /// Rows of the requested page
    pub items: Vec<T>,
    /// Total rows matching the filter
    pub total: usize,
    /// Page that was returned
    pub page: u32,
    /// Page size that was applied
    pub limit: usize,
}

impl<T> PagedResult<T> {
    /// Assemble a page from the full filtered row set
    pub fn paginate(mut rows: Vec<T>, pagination: &Pagination) -> Self {
        let pagination = pagination.normalized();
        let total = rows.len();
        let offset = pagination.offset();
        let items: Vec<T> = if offset >= rows.len() {
            Vec::new()
        } else {
            rows.drain(offset..rows.len().min(offset + pagination.limit))
                .collect()
        };
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
        }
    }

    /// Number of pages at the applied limit
    pub fn total_pages(&self) -> usize {
        if self.limit == 0 {
            0
        } else {
            self.total.div_ceil(self.limit)
        }
    }
}

/// Open-shift search filter; `organization_id` is always required
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShiftFilters {
    /// Owning organization
    pub organization_id: Option<OrganizationId>,
    /// Single branch
    pub branch_id: Option<BranchId>,
    /// Multiple branches; unioned with `branch_id`
    pub branch_ids: Option<Vec<BranchId>>,
    /// Client
    pub client_id: Option<ClientId>,
    /// Earliest scheduled date, inclusive
    pub date_from: Option<NaiveDate>,
    /// Latest scheduled date, inclusive
    pub date_to: Option<NaiveDate>,
    /// Any of these priorities
    pub priority: Option<Vec<ShiftPriority>>,
    /// Any of these lifecycle states
    pub matching_status: Option<Vec<MatchingStatus>>,
    /// Urgency flag
    pub is_urgent: Option<bool>,
    /// Service type
    pub service_type_id: Option<ServiceTypeId>,
}

impl ShiftFilters {
    /// Whether a live shift row matches the filter
    pub fn matches(&self, shift: &OpenShift) -> bool {
        if let Some(org) = self.organization_id {
            if shift.organization_id != org {
                return false;
            }
        }
        let mut branches: Vec<BranchId> = self.branch_ids.clone().unwrap_or_default();
        if let Some(branch) = self.branch_id {
            branches.push(branch);
        }
        if !branches.is_empty() && !branches.contains(&shift.branch_id) {
            return false;
        }
        if let Some(client) = self.client_id {
            if shift.client_id != client {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if shift.scheduled_date < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if shift.scheduled_date > to {
                return false;
            }
        }
        if let Some(priorities) = &self.priority {
            if !priorities.is_empty() && !priorities.contains(&shift.priority) {
                return false;
            }
        }
        if let Some(statuses) = &self.matching_status {
            if !statuses.is_empty() && !statuses.contains(&shift.matching_status) {
                return false;
            }
        }
        if let Some(urgent) = self.is_urgent {
            if shift.is_urgent != urgent {
                return false;
            }
        }
        if let Some(service_type) = self.service_type_id {
            if shift.service_type_id != service_type {
                return false;
            }
        }
        true
    }
}

/// Proposal search filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalFilters {
    /// Owning organization
    pub organization_id: Option<OrganizationId>,
    /// Owning branch
    pub branch_id: Option<BranchId>,
    /// Offered caregiver
    pub caregiver_id: Option<CaregiverId>,
    /// Parent shift
    pub open_shift_id: Option<OpenShiftId>,
    /// Any of these lifecycle states
    pub status: Option<Vec<ProposalStatus>>,
    /// Any of these emission methods
    pub method: Option<Vec<ProposalMethod>>,
    /// Earliest emission instant, inclusive
    pub proposed_from: Option<DateTime<Utc>>,
    /// Latest emission instant, inclusive
    pub proposed_to: Option<DateTime<Utc>>,
}

impl ProposalFilters {
    /// Whether a live proposal row matches the filter
    pub fn matches(&self, proposal: &AssignmentProposal) -> bool {
        if let Some(org) = self.organization_id {
            if proposal.organization_id != org {
                return false;
            }
        }
        if let Some(branch) = self.branch_id {
            if proposal.branch_id != branch {
                return false;
            }
        }
        if let Some(caregiver) = self.caregiver_id {
            if proposal.caregiver_id != caregiver {
                return false;
            }
        }
        if let Some(shift) = self.open_shift_id {
            if proposal.open_shift_id != shift {
                return false;
            }
        }
        if let Some(statuses) = &self.status {
            if !statuses.is_empty() && !statuses.contains(&proposal.status) {
                return false;
            }
        }
        if let Some(methods) = &self.method {
            if !methods.is_empty() && !methods.contains(&proposal.proposal_method) {
                return false;
            }
        }
        if let Some(from) = self.proposed_from {
            if proposal.proposed_at < from {
                return false;
            }
        }
        if let Some(to) = self.proposed_to {
            if proposal.proposed_at > to {
                return false;
            }
        }
        true
    }
}
