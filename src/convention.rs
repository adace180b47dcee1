//! # Convention
//!
//! Describes how a virtual call hands the object it was made on to the implementation.
//!
//! Replacement functions written into a table slot are called exactly like the original, so
//! they must receive the receiver the same way the host compiler passes it:
//! - 32-bit MSVC passes it in `ecx` (`extern "thiscall"`)
//! - everything else passes it as the first argument (`extern "C"` / `extern "system"`)
//!
//! Nothing checks this at runtime. Getting it wrong corrupts the call.

/// Receiver-passing conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// Receiver is passed as the first argument
    FirstArgument,
    /// Receiver is passed in a dedicated register (`ecx` for `thiscall`)
    ThisRegister,
}

impl Receiver {
    /// Convention the host compiler uses for virtual calls
    #[cfg(all(target_arch = "x86", windows))]
    pub const HOST: Self = Self::ThisRegister;

    /// Convention the host compiler uses for virtual calls
    #[cfg(not(all(target_arch = "x86", windows)))]
    pub const HOST: Self = Self::FirstArgument;

    /// Returns `true` if functions using this convention can be called by the host's virtual calls
    pub fn is_host(self) -> bool {
        self == Self::HOST
    }
}

#[cfg(test)]
mod tests {
    use super::Receiver;

    #[test]
    #[cfg(not(all(target_arch = "x86", windows)))]
    /// Anything but 32-bit windows passes the receiver first
    fn test_host() {
        assert_eq!(Receiver::HOST, Receiver::FirstArgument);
        assert!(Receiver::FirstArgument.is_host());
        assert!(!Receiver::ThisRegister.is_host());
    }
}
