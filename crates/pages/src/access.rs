use ims_protocol::{EntityKind, access::EventAccess};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadIncidents,
    WriteIncidents,
    WriteFieldReports,
    AttachFiles,
}

impl Permission {
    pub fn granted(self, access: &EventAccess) -> bool {
        match self {
            Self::ReadIncidents => access.read_incidents,
            Self::WriteIncidents => access.write_incidents,
            Self::WriteFieldReports => access.write_field_reports,
            Self::AttachFiles => access.attach_files,
        }
    }

    fn action(self) -> &'static str {
        match self {
            Self::ReadIncidents => "view incidents",
            Self::WriteIncidents => "edit incidents",
            Self::WriteFieldReports => "write field reports",
            Self::AttachFiles => "attach files",
        }
    }
}

/// The viewer lacks a permission for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub permission: Permission,
    pub event_id: String,
}

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "You are not authorized to {} in event {}",
            self.permission.action(),
            self.event_id
        )
    }
}

impl std::error::Error for AccessDenied {}

/// Permission needed to open a record of `kind`.
///
/// Reporters may open field reports without reading incidents.
pub fn view_permission(kind: EntityKind, access: &EventAccess) -> Permission {
    match kind {
        EntityKind::FieldReport if access.write_field_reports => Permission::WriteFieldReports,
        _ => Permission::ReadIncidents,
    }
}

pub fn edit_permission(kind: EntityKind) -> Permission {
    match kind {
        EntityKind::FieldReport => Permission::WriteFieldReports,
        EntityKind::Incident | EntityKind::Stay => Permission::WriteIncidents,
    }
}

pub fn require(
    permission: Permission,
    access: &EventAccess,
    event_id: &str,
) -> Result<(), AccessDenied> {
    if permission.granted(access) {
        Ok(())
    } else {
        Err(AccessDenied {
            permission,
            event_id: event_id.to_string(),
        })
    }
}

pub fn check_view(kind: EntityKind, access: &EventAccess, event_id: &str) -> Result<(), AccessDenied> {
    require(view_permission(kind, access), access, event_id)
}

pub fn check_edit(kind: EntityKind, access: &EventAccess, event_id: &str) -> Result<(), AccessDenied> {
    require(edit_permission(kind), access, event_id)
}
