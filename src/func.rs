//! # Func
//!
//! Conversions between function pointers and the plain addresses stored in table slots.
//!
//! Two shapes of function pointer exist as far as a method table is concerned:
//! - free functions ([`Function`]), which can be any function pointer
//! - methods ([`Method`]), whose first parameter is the receiver, passed according to a
//!   [`Receiver`] convention

use std::mem;

use crate::convention::Receiver;

/// Function pointers that can be stored in and loaded from a table slot
///
/// # Safety
///
/// Implementors must be address-sized function pointers. This is implemented for all
/// function pointer types up to 8 arguments and should not be implemented by users.
pub unsafe trait Function: Copy {
    /// Number of arguments the function takes, receiver included
    const ARITY: usize;

    /// Reinterprets a slot value as this function pointer type
    ///
    /// # Safety
    ///
    /// `addr` must be non-null and point to a function whose signature and calling convention
    /// match `Self`. A mismatch will not be detected and calling the result is undefined
    /// behavior.
    unsafe fn from_addr(addr: usize) -> Self;

    /// Returns the address of this function
    fn to_addr(&self) -> usize;
}

/// Function pointers shaped like a method of `T`: the receiver is the first parameter
///
/// # Safety
///
/// Implementors must pass a pointer to `T` as their receiver following [`Method::RECEIVER`].
/// This should not be implemented by users.
pub unsafe trait Method<T>: Function {
    /// How the receiver reaches the function
    const RECEIVER: Receiver;
}

/// Converts a function pointer to the address that gets written into a table slot
pub fn cfunc<F: Function>(f: F) -> usize {
    f.to_addr()
}

/// Implements [`Function`] for the safe and unsafe variants of a function pointer type
macro_rules! impl_function {
    (@pair ($($arg:ident),*) ($($fn_t:tt)*)) => {
        impl_function!(@impl ($($arg),*) ($($fn_t)*));
        impl_function!(@impl ($($arg),*) (unsafe $($fn_t)*));
    };

    (@impl ($($arg:ident),*) ($($fn_t:tt)*)) => {
        unsafe impl<Ret, $($arg),*> Function for $($fn_t)* {
            const ARITY: usize = <[&str]>::len(&[$(stringify!($arg)),*]);

            unsafe fn from_addr(addr: usize) -> Self {
                mem::transmute::<usize, Self>(addr)
            }

            fn to_addr(&self) -> usize {
                *self as usize
            }
        }
    };

    ($($arg:ident),*) => {
        impl_function!(@pair ($($arg),*) (fn($($arg),*) -> Ret));
        impl_function!(@pair ($($arg),*) (extern "C" fn($($arg),*) -> Ret));
        impl_function!(@pair ($($arg),*) (extern "C-unwind" fn($($arg),*) -> Ret));
        impl_function!(@pair ($($arg),*) (extern "system" fn($($arg),*) -> Ret));

        #[cfg(target_arch = "x86")]
        impl_function!(@pair ($($arg),*) (extern "thiscall" fn($($arg),*) -> Ret));
    };
}

/// Implements [`Method`] for function pointers taking `*mut T` or `*const T` first
macro_rules! impl_method {
    (@pair $receiver:expr; ($($arg:ident),*) ($($abi:tt)*)) => {
        impl_method!(@impl $receiver; ($($arg),*) ($($abi)* fn(*mut T $(, $arg)*) -> Ret));
        impl_method!(@impl $receiver; ($($arg),*) ($($abi)* fn(*const T $(, $arg)*) -> Ret));
        impl_method!(@impl $receiver; ($($arg),*) (unsafe $($abi)* fn(*mut T $(, $arg)*) -> Ret));
        impl_method!(@impl $receiver; ($($arg),*) (unsafe $($abi)* fn(*const T $(, $arg)*) -> Ret));
    };

    (@impl $receiver:expr; ($($arg:ident),*) ($($fn_t:tt)*)) => {
        unsafe impl<T, Ret, $($arg),*> Method<T> for $($fn_t)* {
            const RECEIVER: Receiver = $receiver;
        }
    };

    ($($arg:ident),*) => {
        impl_method!(@pair Receiver::FirstArgument; ($($arg),*) (extern "C"));
        impl_method!(@pair Receiver::FirstArgument; ($($arg),*) (extern "C-unwind"));
        impl_method!(@pair Receiver::FirstArgument; ($($arg),*) (extern "system"));

        #[cfg(target_arch = "x86")]
        impl_method!(@pair Receiver::ThisRegister; ($($arg),*) (extern "thiscall"));
    };
}

impl_function!();
impl_function!(A);
impl_function!(A, B);
impl_function!(A, B, C);
impl_function!(A, B, C, D);
impl_function!(A, B, C, D, E);
impl_function!(A, B, C, D, E, F);
impl_function!(A, B, C, D, E, F, G);
impl_function!(A, B, C, D, E, F, G, H);

impl_method!();
impl_method!(A);
impl_method!(A, B);
impl_method!(A, B, C);
impl_method!(A, B, C, D);
impl_method!(A, B, C, D, E);
impl_method!(A, B, C, D, E, F);
impl_method!(A, B, C, D, E, F, G);

#[cfg(test)]
mod tests {
    use super::{cfunc, Function, Method};
    use crate::convention::Receiver;

    /// Receiver type for the method tests
    struct Counter(u32);

    /// Free function under test
    fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    /// Method-shaped function under test
    extern "C" fn get(this: *const Counter) -> u32 {
        unsafe { (*this).0 }
    }

    /// Returns the receiver convention of a method-shaped function pointer
    fn receiver_of<T, F: Method<T>>(_: F) -> Receiver {
        F::RECEIVER
    }

    #[test]
    /// Converting to an address and back yields a callable function
    fn test_roundtrip() {
        let addr = cfunc(add as fn(i32, i32) -> i32);
        assert_eq!(addr, add as usize);

        let f = unsafe { <fn(i32, i32) -> i32>::from_addr(addr) };
        assert_eq!(f(2, 3), 5);
    }

    #[test]
    /// Arity counts every parameter, receiver included
    fn test_arity() {
        assert_eq!(<fn() -> ()>::ARITY, 0);
        assert_eq!(<fn(i32, i32) -> i32>::ARITY, 2);
        assert_eq!(<extern "C" fn(*const Counter) -> u32>::ARITY, 1);
        assert_eq!(<unsafe extern "C" fn(u8, u8, u8, u8, u8, u8, u8, u8)>::ARITY, 8);
    }

    #[test]
    /// Methods are reinterpreted like any other function and keep their receiver
    fn test_method() {
        let counter = Counter(42);
        let f = get as extern "C" fn(*const Counter) -> u32;

        assert_eq!(receiver_of::<Counter, _>(f), Receiver::FirstArgument);

        let g = unsafe { <extern "C" fn(*const Counter) -> u32>::from_addr(cfunc(f)) };
        assert_eq!(g(&counter), 42);
    }
}
