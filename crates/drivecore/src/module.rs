//! Module identity
//!
//! The drivetrain always has exactly four modules in a fixed order. Every
//! per-module value is stored in a [`PerModule`] and indexed by [`ModuleId`],
//! so one module's reading can never be served through another's accessor.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Number of swerve modules on the chassis.
pub const MODULE_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleId {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl ModuleId {
    /// All modules, in kinematic order.
    pub const ALL: [ModuleId; MODULE_COUNT] = [
        ModuleId::FrontLeft,
        ModuleId::FrontRight,
        ModuleId::BackLeft,
        ModuleId::BackRight,
    ];

    pub fn index(self) -> usize {
        match self {
            ModuleId::FrontLeft => 0,
            ModuleId::FrontRight => 1,
            ModuleId::BackLeft => 2,
            ModuleId::BackRight => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModuleId::FrontLeft => "Front Left",
            ModuleId::FrontRight => "Front Right",
            ModuleId::BackLeft => "Back Left",
            ModuleId::BackRight => "Back Right",
        }
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per module, in [`ModuleId::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerModule<T>(pub [T; MODULE_COUNT]);

impl<T> PerModule<T> {
    pub fn new(values: [T; MODULE_COUNT]) -> Self {
        PerModule(values)
    }

    pub fn from_fn(mut f: impl FnMut(ModuleId) -> T) -> Self {
        PerModule(ModuleId::ALL.map(&mut f))
    }

    pub fn map<U>(self, mut f: impl FnMut(ModuleId, T) -> U) -> PerModule<U> {
        let mut slot = 0;
        PerModule(self.0.map(|value| {
            let id = ModuleId::ALL[slot];
            slot += 1;
            f(id, value)
        }))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &T)> {
        ModuleId::ALL.into_iter().zip(self.0.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ModuleId, &mut T)> {
        ModuleId::ALL.into_iter().zip(self.0.iter_mut())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }

    pub fn as_array(&self) -> &[T; MODULE_COUNT] {
        &self.0
    }

    pub fn into_array(self) -> [T; MODULE_COUNT] {
        self.0
    }
}

impl<T: Clone> PerModule<T> {
    pub fn splat(value: T) -> Self {
        PerModule::from_fn(|_| value.clone())
    }
}

impl<T> Index<ModuleId> for PerModule<T> {
    type Output = T;

    fn index(&self, id: ModuleId) -> &T {
        &self.0[id.index()]
    }
}

impl<T> IndexMut<ModuleId> for PerModule<T> {
    fn index_mut(&mut self, id: ModuleId) -> &mut T {
        &mut self.0[id.index()]
    }
}

impl<T> From<[T; MODULE_COUNT]> for PerModule<T> {
    fn from(values: [T; MODULE_COUNT]) -> Self {
        PerModule(values)
    }
}
