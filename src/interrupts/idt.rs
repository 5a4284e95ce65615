use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};
use lazy_static::lazy_static;
use crate::{println, log_error};
use crate::sync::intr;
use super::gdt;
use pic8259::ChainedPics;
use spin::Mutex;

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

pub static PICS: Mutex<ChainedPics> = Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,
    Keyboard = PIC_1_OFFSET + 1,
}

impl InterruptIndex {
    fn as_u8(self) -> u8 {
        self as u8
    }

    fn as_usize(self) -> usize {
        usize::from(self.as_u8())
    }
}

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        unsafe {
            idt.double_fault.set_handler_fn(double_fault_handler)
                .set_stack_index(gdt::DOUBLE_FAULT_IST_INDEX);
        }
        idt.page_fault.set_handler_fn(page_fault_handler);
        idt.general_protection_fault.set_handler_fn(general_protection_fault_handler);
        idt[InterruptIndex::Timer.as_usize()]
            .set_handler_fn(timer_interrupt_handler);
        idt[InterruptIndex::Keyboard.as_usize()]
            .set_handler_fn(keyboard_interrupt_handler);
        unsafe {
            idt[0x80]
                .set_handler_addr(x86_64::VirtAddr::new(
                    super::usermode::syscall_handler_asm as usize as u64,
                ))
                .set_privilege_level(x86_64::PrivilegeLevel::Ring3);
        }
        idt
    };
}

pub fn init() {
    IDT.load();
}

extern "x86-interrupt" fn breakpoint_handler(
    stack_frame: InterruptStackFrame)
{
    println!("EXCEPTION: BREAKPOINT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame, _error_code: u64) -> !
{
    panic!("EXCEPTION: DOUBLE FAULT\n{:#?}", stack_frame);
}

/// Routes a page fault to `vm::fault::handle`. A fault the VM subsystem
/// can't resolve (bad address, write to read-only, corrupt stack growth)
/// kills the faulting process thread if one caused it from user mode or
/// from inside a syscall; a fault in plain kernel code is a bug and
/// panics, same as the original's `page_fault_handler` falling through
/// to `kill`.
extern "x86-interrupt" fn page_fault_handler(stack_frame: InterruptStackFrame, error_code: PageFaultErrorCode) {
    use x86_64::registers::control::Cr2;
    let fault_vaddr = Cr2::read().as_u64();
    let owner = crate::scheduler::current_thread_id();
    let rsp = stack_frame.stack_pointer.as_u64();

    match crate::vm::fault::handle(owner, fault_vaddr, error_code, rsp) {
        crate::vm::fault::Outcome::Resolved => {}
        crate::vm::fault::Outcome::Unhandled => {
            if crate::memory::paging::is_user_address(fault_vaddr) || intr::in_syscall() {
                log_error!(
                    "unhandled page fault at {:#x} (tid {}), killing process",
                    fault_vaddr,
                    owner.0
                );
                crate::scheduler::exit_current(-1);
            }
            log_error!("EXCEPTION: PAGE FAULT at {:#x}\nError Code: {:?}", fault_vaddr, error_code);
            panic!("unresolved kernel-mode page fault\n{:#?}", stack_frame);
        }
    }
}

extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    intr::run_as_external_interrupt(|| {
        crate::devices::timer::on_tick();
    });
    unsafe {
        PICS.lock().notify_end_of_interrupt(InterruptIndex::Timer.as_u8());
    }
    if intr::take_yield_on_return() {
        crate::scheduler::yield_now();
    }
}

extern "x86-interrupt" fn keyboard_interrupt_handler(_stack_frame: InterruptStackFrame) {
    use x86_64::instructions::port::Port;
    let mut port: Port<u8> = Port::new(0x60);
    let _scancode = unsafe { port.read() };

    unsafe {
        PICS.lock()
            .notify_end_of_interrupt(InterruptIndex::Keyboard.as_u8());
    }
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame, error_code: u64)
{
    panic!("EXCEPTION: GENERAL PROTECTION FAULT\nError Code: {error_code}\n{:#?}", stack_frame);
}
