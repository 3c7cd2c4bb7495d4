//! Role-based capabilities.
//!
//! Every capability is granted to an explicit list of roles in [`GRANTS`].
//! [`evaluate`] is the only place that reads the table; adding a resource type
//! means adding rows there and nowhere else.

use std::fmt;

use serde::{Serialize, Serializer, ser::SerializeMap};
use strum::IntoEnumIterator as _;

use crate::identity::{Identity, Role};

// ─── Capability ──────────────────────────────────────────────────────────────

/// A single named permission flag.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::EnumCount,
)]
#[repr(u8)]
pub enum Capability {
  ManageUsers,
  ViewUsers,
  CreateUsers,
  EditUsers,
  DeleteUsers,
  ChangeRoles,

  ViewProducts,
  CreateProducts,
  EditProducts,
  DeleteProducts,

  ViewInventory,
  CreateInventory,
  UpdateInventory,
  DeleteInventory,

  ViewSuppliers,
  CreateSuppliers,
  EditSuppliers,
  DeleteSuppliers,

  ViewReports,

  UseChat,
}

impl Capability {
  /// The flag name the UI layer uses, e.g. `canDeleteProducts`.
  pub fn flag_name(self) -> &'static str {
    match self {
      Self::ManageUsers => "canManageUsers",
      Self::ViewUsers => "canViewUsers",
      Self::CreateUsers => "canCreateUsers",
      Self::EditUsers => "canEditUsers",
      Self::DeleteUsers => "canDeleteUsers",
      Self::ChangeRoles => "canChangeRoles",
      Self::ViewProducts => "canViewProducts",
      Self::CreateProducts => "canCreateProducts",
      Self::EditProducts => "canEditProducts",
      Self::DeleteProducts => "canDeleteProducts",
      Self::ViewInventory => "canViewInventory",
      Self::CreateInventory => "canCreateInventory",
      Self::UpdateInventory => "canUpdateInventory",
      Self::DeleteInventory => "canDeleteInventory",
      Self::ViewSuppliers => "canViewSuppliers",
      Self::CreateSuppliers => "canCreateSuppliers",
      Self::EditSuppliers => "canEditSuppliers",
      Self::DeleteSuppliers => "canDeleteSuppliers",
      Self::ViewReports => "canViewReports",
      Self::UseChat => "canUseChat",
    }
  }

  fn bit(self) -> u32 { 1 << (self as u8) }
}

impl fmt::Display for Capability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.flag_name())
  }
}

// ─── Grant table ─────────────────────────────────────────────────────────────

const ADMIN: &[Role] = &[Role::Admin];
const STAFF: &[Role] = &[Role::Admin, Role::Usuario];
const EVERYONE: &[Role] = &[Role::Admin, Role::Usuario, Role::Invitado];

/// Which roles hold each capability. Legacy roles appear in no row.
pub const GRANTS: &[(Capability, &[Role])] = &[
  (Capability::ManageUsers, ADMIN),
  (Capability::ViewUsers, STAFF),
  (Capability::CreateUsers, ADMIN),
  (Capability::EditUsers, ADMIN),
  (Capability::DeleteUsers, ADMIN),
  (Capability::ChangeRoles, ADMIN),
  (Capability::ViewProducts, EVERYONE),
  (Capability::CreateProducts, STAFF),
  (Capability::EditProducts, STAFF),
  (Capability::DeleteProducts, ADMIN),
  (Capability::ViewInventory, EVERYONE),
  (Capability::CreateInventory, STAFF),
  (Capability::UpdateInventory, STAFF),
  (Capability::DeleteInventory, ADMIN),
  (Capability::ViewSuppliers, EVERYONE),
  (Capability::CreateSuppliers, STAFF),
  (Capability::EditSuppliers, STAFF),
  (Capability::DeleteSuppliers, ADMIN),
  (Capability::ViewReports, STAFF),
  (Capability::UseChat, EVERYONE),
];

// ─── CapabilitySet ───────────────────────────────────────────────────────────

/// The derived permission flags for one identity. Recomputed on demand,
/// never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet {
  bits: u32,
}

impl CapabilitySet {
  pub const fn empty() -> Self { Self { bits: 0 } }

  pub fn contains(&self, capability: Capability) -> bool {
    self.bits & capability.bit() != 0
  }

  pub fn insert(&mut self, capability: Capability) { self.bits |= capability.bit(); }

  pub fn is_empty(&self) -> bool { self.bits == 0 }

  pub fn len(&self) -> usize { self.bits.count_ones() as usize }

  /// Granted capabilities in declaration order.
  pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
    Capability::iter().filter(|c| self.contains(*c))
  }
}

impl FromIterator<Capability> for CapabilitySet {
  fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
    let mut set = Self::empty();
    for capability in iter {
      set.insert(capability);
    }
    set
  }
}

/// Serialises as a flat `{"canViewUsers": true, ...}` object with every flag
/// present, which is the shape the UI layer consumes.
impl Serialize for CapabilitySet {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(<Capability as strum::EnumCount>::COUNT))?;
    for capability in Capability::iter() {
      map.serialize_entry(capability.flag_name(), &self.contains(capability))?;
    }
    map.end()
  }
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

/// Capabilities granted to `role`.
pub fn capabilities_for(role: Role) -> CapabilitySet {
  GRANTS
    .iter()
    .filter(|(_, roles)| roles.contains(&role))
    .map(|(capability, _)| *capability)
    .collect()
}

/// Derive the capability set for an optional identity. An absent identity
/// holds nothing.
pub fn evaluate(identity: Option<&Identity>) -> CapabilitySet {
  identity.map_or_else(CapabilitySet::empty, |id| capabilities_for(id.role))
}
