use std::ops::{Deref, DerefMut};

use crate::models::state::CallingMode;

/// Mutual exclusion whose waiting strategy follows the stream's calling mode.
///
/// Blocking streams park on a `parking_lot` mutex. Non-blocking streams,
/// whose producers may run in signal context, busy-wait on a spin lock and
/// never enter the kernel.
pub enum CriticalSection<T> {
    Blocking(parking_lot::Mutex<T>),
    Spin(spin::Mutex<T>),
}

impl<T> CriticalSection<T> {
    pub fn new(mode: CallingMode, value: T) -> Self {
        match mode {
            CallingMode::Blocking => Self::Blocking(parking_lot::Mutex::new(value)),
            CallingMode::NonBlocking => Self::Spin(spin::Mutex::new(value)),
        }
    }

    pub fn mode(&self) -> CallingMode {
        match self {
            Self::Blocking(_) => CallingMode::Blocking,
            Self::Spin(_) => CallingMode::NonBlocking,
        }
    }

    pub fn lock(&self) -> SectionGuard<'_, T> {
        match self {
            Self::Blocking(m) => SectionGuard::Blocking(m.lock()),
            Self::Spin(m) => SectionGuard::Spin(m.lock()),
        }
    }

    pub fn try_lock(&self) -> Option<SectionGuard<'_, T>> {
        match self {
            Self::Blocking(m) => m.try_lock().map(SectionGuard::Blocking),
            Self::Spin(m) => m.try_lock().map(SectionGuard::Spin),
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Blocking(m) => m.into_inner(),
            Self::Spin(m) => m.into_inner(),
        }
    }
}

pub enum SectionGuard<'a, T> {
    Blocking(parking_lot::MutexGuard<'a, T>),
    Spin(spin::MutexGuard<'a, T>),
}

impl<T> Deref for SectionGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self {
            Self::Blocking(g) => g,
            Self::Spin(g) => g,
        }
    }
}

impl<T> DerefMut for SectionGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match self {
            Self::Blocking(g) => g,
            Self::Spin(g) => g,
        }
    }
}
