// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Scrubbing of GMP-managed memory.
//!
//! Secret big numbers ultimately live in heap buffers managed by GMP, which
//! reallocates and copies limb arrays invisibly to Rust code, so a
//! [`zeroize`]-style wrapper on the Rust side cannot reach every copy. GMP
//! accepts custom memory-management functions; [`enable_zeroize`] installs
//! wrappers that erase every buffer as it is released, which covers the
//! intermediate copies as well.

use gmp_mpfr_sys::gmp::{
    allocate_function, free_function, get_memory_functions, reallocate_function,
    set_memory_functions,
};
use std::{ffi::c_void, ptr::addr_of_mut, slice, sync::Once};
use zeroize::Zeroize;

static ONCE: Once = Once::new();

static mut GMP_ALLOCATE: allocate_function = None;
static mut GMP_REALLOCATE: reallocate_function = None;
static mut GMP_FREE: free_function = None;

/// Enable zeroization of GMP memory allocations.
///
/// Hosts should call this once on startup, before any protocol runs. The
/// function is idempotent.
pub fn enable_zeroize() {
    ONCE.call_once(install_scrubbing_allocator);
}

fn install_scrubbing_allocator() {
    unsafe {
        // SAFETY: Calling a C API documented here:
        // https://gmplib.org/manual/Custom-Allocation
        get_memory_functions(
            addr_of_mut!(GMP_ALLOCATE),
            addr_of_mut!(GMP_REALLOCATE),
            addr_of_mut!(GMP_FREE),
        );
        assert!(
            GMP_ALLOCATE.and(GMP_REALLOCATE).and(GMP_FREE).is_some(),
            "GMP should return its memory functions."
        );
        // Allocation stays as-is; only the paths that release a buffer need
        // wrapping.
        set_memory_functions(None, Some(scrubbing_reallocate), Some(scrubbing_free));
    }
}

extern "C" fn scrubbing_reallocate(
    old_ptr: *mut c_void,
    old_size: usize,
    new_size: usize,
) -> *mut c_void {
    // The underlying realloc would take ownership of the old buffer before
    // it can be erased, so this allocates fresh, copies, and releases the
    // old buffer through the scrubbing path.
    unsafe {
        // SAFETY: this function can only be called after GMP_ALLOCATE is
        // set.
        let new_ptr = GMP_ALLOCATE.unwrap()(new_size);
        {
            // SAFETY: per the GMP documentation, `old_ptr` is never NULL
            // and points to a previously allocated block of `old_size`
            // bytes.
            let copied = old_size.min(new_size);
            let old_data = slice::from_raw_parts(old_ptr as *const u8, copied);
            let new_data = slice::from_raw_parts_mut(new_ptr as *mut u8, copied);
            new_data.copy_from_slice(old_data);
        }
        scrubbing_free(old_ptr, old_size);
        new_ptr
    }
}

extern "C" fn scrubbing_free(ptr: *mut c_void, size: usize) {
    unsafe {
        // SAFETY: per the GMP documentation, `ptr` is never NULL and points
        // to a previously allocated block of `size` bytes.
        let data = slice::from_raw_parts_mut(ptr as *mut u8, size);
        data.zeroize();
        // SAFETY: this function can only be called after GMP_FREE is set.
        GMP_FREE.unwrap()(ptr, size);
    }
}
