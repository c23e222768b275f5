pub mod click_event;
pub mod custom_domain;
pub mod link;
pub mod workspace;
pub mod workspace_member;
pub mod workspace_usage;

pub use click_event::Entity as ClickEventEntity;
pub use custom_domain::Entity as CustomDomainEntity;
pub use link::Entity as LinkEntity;
pub use workspace::Entity as WorkspaceEntity;
pub use workspace_member::Entity as WorkspaceMemberEntity;
pub use workspace_usage::Entity as WorkspaceUsageEntity;
