//! The single mutable aggregate behind the process core.
//!
//! Every transition here runs with the state lock held and interrupts
//! masked; none of them block or transfer control. The caller performs the
//! control transfer afterwards, outside the lock.

use x86_64::VirtAddr;

use crate::config::{
    KernelConfig, FIRST_USER_FD, MAX_ARG_LEN, MAX_FILES, PROGRAM_IMAGE_BASE, ROOT_SHELL,
    USER_STACK_TOP,
};
use crate::devices::{DeviceIo, DeviceKind, FileCursor, FileSystem};
use crate::hal::{Launch, Machine};
use crate::loader::{file_name, Command, Executable};
use crate::memory::AddressSpace;
use crate::process::{
    FileDescriptor, Pid, ProcessTable, SavedContext, TerminalBindings, TerminalId,
};
use crate::scheduler::RoundRobin;
use crate::syscalls::SyscallError;

pub struct SchedulerState {
    pub config: KernelConfig,
    pub processes: ProcessTable,
    pub terminals: TerminalBindings,
    pub scheduler: RoundRobin,
    pub address_space: AddressSpace,
    /// Boot thread context, used when a tick arrives with no task current.
    pub(crate) idle_context: SavedContext,
}

/// Where `halt` continues and with what status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HaltTransition {
    pub halted: Pid,
    pub resume: SavedContext,
    pub status: i32,
}

/// Descriptor snapshot taken under the lock for a blocking read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoRequest {
    pub pid: Pid,
    pub fd: i32,
    pub device: DeviceKind,
    pub cursor: FileCursor,
}

impl SchedulerState {
    pub const fn new(config: KernelConfig) -> Self {
        Self {
            config,
            processes: ProcessTable::new(),
            terminals: TerminalBindings::new(),
            scheduler: RoundRobin::new(),
            address_space: AddressSpace::new(config),
            idle_context: SavedContext::empty(),
        }
    }

    /// The process bound to the terminal last dispatched.
    pub fn current_pid(&self) -> Option<Pid> {
        self.terminals.get(self.scheduler.cursor())
    }

    pub fn require_current(&self) -> Result<Pid, SyscallError> {
        self.current_pid().ok_or(SyscallError::NoCurrentProcess)
    }

    /// Create, bind and load a process for `command` on `terminal`.
    ///
    /// On success the new process is bound to `terminal`, its program
    /// region is installed and filled, and the TSS points at its kernel
    /// stack. On failure nothing observable has changed.
    pub fn begin_execute<M, F>(
        &mut self,
        command: &[u8],
        terminal: TerminalId,
        parent: Option<Pid>,
        machine: &M,
        fs: &F,
    ) -> Result<Launch, SyscallError>
    where
        M: Machine + ?Sized,
        F: FileSystem + ?Sized,
    {
        let command = Command::parse(command)?;
        let dentry = fs.resolve(command.program).ok_or(SyscallError::NotFound)?;
        let executable = Executable::inspect(fs, &dentry)?;

        let pid = self.processes.allocate()?;
        self.processes.init(pid, terminal, parent)?;
        {
            let pcb = self.processes.get_mut(pid)?;
            pcb.set_name(command.program);
            pcb.set_args(command.args);
            pcb.entry_point = executable.entry;
            pcb.image_base = VirtAddr::new(PROGRAM_IMAGE_BASE);
        }
        let previous = self.terminals.bind(terminal, pid)?;

        let loaded = self
            .address_space
            .map_process_image(pid, machine)
            .map_err(SyscallError::from)
            .and_then(|_| executable.load(fs, machine));
        if let Err(err) = loaded {
            self.abort_execute(pid, terminal, previous, machine);
            return Err(err);
        }

        let kernel_stack = self.config.kernel_stack_top(pid);
        machine.set_kernel_stack(kernel_stack);
        println!(
            "exec: pid {} on terminal {} ({:?})",
            pid,
            terminal,
            core::str::from_utf8(command.program).unwrap_or("?")
        );

        Ok(Launch {
            pid,
            entry: executable.entry,
            user_stack: VirtAddr::new(USER_STACK_TOP),
            kernel_stack,
        })
    }

    fn abort_execute<M: Machine + ?Sized>(
        &mut self,
        pid: Pid,
        terminal: TerminalId,
        previous: Option<Pid>,
        machine: &M,
    ) {
        let _ = self.processes.free(pid);
        let _ = match previous {
            Some(prior) => self.terminals.bind(terminal, prior),
            None => self.terminals.unbind(terminal),
        };
        if let Some(running) = self.current_pid() {
            if let Err(err) = self.address_space.map_process_image(running, machine) {
                println!("exec: could not restore mapping of pid {}: {:?}", running, err);
            }
        }
    }

    /// Context slot the `execute` transfer saves the parent's kernel
    /// context into.
    pub fn parent_context_slot(&mut self, pid: Pid) -> Result<*mut SavedContext, SyscallError> {
        Ok(self.processes.parent_context_mut(pid)? as *mut SavedContext)
    }

    /// Tear down the current process and decide where execution continues.
    ///
    /// A child hands the terminal back to its parent and resumes the
    /// parent's `execute` call with `status`. A root shell is replaced by a
    /// fresh shell on the same terminal.
    pub fn halt_transition<M, F>(
        &mut self,
        status: i32,
        io: &DeviceIo<'_>,
        machine: &M,
        fs: &F,
    ) -> Result<HaltTransition, SyscallError>
    where
        M: Machine + ?Sized,
        F: FileSystem + ?Sized,
    {
        let pid = self.require_current()?;
        let (terminal, parent, resume) = {
            let pcb = self.processes.get(pid)?;
            (pcb.terminal, pcb.parent, pcb.parent_context)
        };

        self.close_all(pid, io)?;
        self.address_space.release_process(pid, machine)?;
        self.processes.free(pid)?;

        match parent {
            Some(parent) => {
                self.terminals.bind(terminal, parent)?;
                self.address_space.map_process_image(parent, machine)?;
                machine.set_kernel_stack(self.config.kernel_stack_top(parent));
                println!("halt: pid {} -> parent {} with status {}", pid, parent, status);
                Ok(HaltTransition {
                    halted: pid,
                    resume,
                    status,
                })
            }
            None => {
                println!("halt: root shell pid {} exited, restarting", pid);
                self.terminals.unbind(terminal)?;
                let launch = self.stage_root_shell(terminal, machine, fs)?;
                let resume = self.processes.get(launch.pid)?.context;
                Ok(HaltTransition {
                    halted: pid,
                    resume,
                    status: 0,
                })
            }
        }
    }

    /// Leave `terminal` with no task after a halt that found nothing to
    /// resume. Whatever is still bound there is torn down, and the
    /// scheduler stages a fresh root shell on a later tick.
    pub fn orphan_terminal<M: Machine + ?Sized>(&mut self, terminal: TerminalId, machine: &M) {
        if let Ok(Some(pid)) = self.terminals.unbind(terminal) {
            if self.processes.is_running(pid) {
                if let Err(err) = self.address_space.release_process(pid, machine) {
                    println!("halt: could not release pid {}: {:?}", pid, err);
                }
                if let Err(err) = self.processes.free(pid) {
                    println!("halt: could not free pid {}: {:?}", pid, err);
                }
            }
        }
        self.scheduler.mark_pending(terminal);
    }

    /// Start a root shell on `terminal` that runs the first time its
    /// context is resumed.
    pub fn stage_root_shell<M, F>(
        &mut self,
        terminal: TerminalId,
        machine: &M,
        fs: &F,
    ) -> Result<Launch, SyscallError>
    where
        M: Machine + ?Sized,
        F: FileSystem + ?Sized,
    {
        let launch = self.begin_execute(ROOT_SHELL, terminal, None, machine, fs)?;
        // The new pid's kernel stack is unused until this context runs.
        let context = unsafe { machine.prepare_first_run(launch.kernel_stack, &launch) };
        *self.processes.context_mut(launch.pid)? = context;
        Ok(launch)
    }

    fn close_all(&mut self, pid: Pid, io: &DeviceIo<'_>) -> Result<(), SyscallError> {
        let pcb = self.processes.get_mut(pid)?;
        for file in pcb.files.iter_mut().skip(FIRST_USER_FD) {
            if let (true, Some(device)) = (file.active, file.device) {
                device.close(io, pcb.terminal)?;
            }
            file.reset();
        }
        Ok(())
    }

    /// Resolve `name` and bind it to the lowest free descriptor of the
    /// current process.
    pub fn open<F: FileSystem + ?Sized>(
        &mut self,
        name: &[u8],
        io: &DeviceIo<'_>,
        fs: &F,
    ) -> Result<usize, SyscallError> {
        let pid = self.require_current()?;
        let name = file_name(name)?;
        let dentry = fs.resolve(name).ok_or(SyscallError::NotFound)?;
        let device = dentry.kind().ok_or(SyscallError::NotFound)?;
        let fd = self.processes.free_descriptor(pid)?;

        let pcb = self.processes.get_mut(pid)?;
        pcb.files[fd] = FileDescriptor::open(device, dentry.inode);
        if let Err(err) = device.open(io, pcb.terminal) {
            pcb.files[fd].reset();
            return Err(err);
        }
        Ok(fd)
    }

    pub fn close(&mut self, fd: i32, io: &DeviceIo<'_>) -> Result<(), SyscallError> {
        let pid = self.require_current()?;
        if !(FIRST_USER_FD as i32..MAX_FILES as i32).contains(&fd) {
            return Err(SyscallError::BadFileDescriptor);
        }
        let terminal = self.processes.get(pid)?.terminal;
        let file = self.processes.descriptor_mut(pid, fd)?;
        if let Some(device) = file.device {
            device.close(io, terminal)?;
        }
        file.reset();
        Ok(())
    }

    /// Snapshot descriptor `fd` of the current process.
    pub fn io_request(&self, fd: i32) -> Result<IoRequest, SyscallError> {
        let pid = self.require_current()?;
        let terminal = self.processes.get(pid)?.terminal;
        let file = self.processes.descriptor(pid, fd)?;
        Ok(IoRequest {
            pid,
            fd,
            device: file.device.ok_or(SyscallError::BadFileDescriptor)?,
            cursor: FileCursor {
                terminal,
                inode: file.inode,
                position: file.position,
            },
        })
    }

    /// Store the cursor a read left behind, unless the slot changed hands
    /// while the caller was blocked.
    pub fn commit_position(&mut self, request: &IoRequest, position: u32) {
        if let Ok(file) = self.processes.descriptor_mut(request.pid, request.fd) {
            if file.device == Some(request.device) && file.inode == request.cursor.inode {
                file.position = position;
            }
        }
    }

    /// Copy the current process's argument string, NUL-terminated.
    pub fn getargs(&self, buf: &mut [u8]) -> Result<usize, SyscallError> {
        let pid = self.require_current()?;
        let args = self.processes.get(pid)?.args();
        if args.is_empty() || args.len() > MAX_ARG_LEN || args.len() + 1 > buf.len() {
            return Err(SyscallError::InvalidArgument);
        }
        buf[..args.len()].copy_from_slice(args);
        buf[args.len()] = 0;
        Ok(0)
    }

    pub fn vidmap<M: Machine + ?Sized>(&mut self, machine: &M) -> Result<VirtAddr, SyscallError> {
        let pid = self.require_current()?;
        let terminal = self.processes.get(pid)?.terminal;
        let screen = self.address_space.map_display(terminal, pid, machine)?;
        println!("vidmap: pid {} terminal {} at {:#x}", pid, terminal, screen.as_u64());
        Ok(screen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAX_PROCESSES, MIB};
    use crate::testing::{Event, Fixture};
    use x86_64::PhysAddr;

    #[test]
    fn test_begin_execute_binds_and_loads() {
        let fx = Fixture::new();
        let mut state = fx.state();
        let launch = state
            .begin_execute(b"shell", 0, None, &fx.machine, &fx.fs())
            .unwrap();

        assert_eq!(launch.pid, 0);
        assert_eq!(launch.entry.as_u64(), Fixture::SHELL_ENTRY);
        assert_eq!(launch.user_stack.as_u64(), USER_STACK_TOP);
        assert_eq!(launch.kernel_stack.as_u64(), 8 * MIB);
        assert_eq!(state.terminals.get(0), Some(0));
        assert_eq!(state.address_space.installed(), Some(0));
        assert_eq!(fx.machine.installed_program(), Some(PhysAddr::new(8 * MIB)));
        assert_eq!(fx.machine.kernel_stack(), Some(VirtAddr::new(8 * MIB)));
        assert_eq!(state.processes.get(0).unwrap().name(), b"shell");
    }

    #[test]
    fn test_execute_rejects_before_allocating() {
        let fx = Fixture::new();
        let mut state = fx.state();
        let fs = fx.fs();
        assert_eq!(
            state.begin_execute(b"", 0, None, &fx.machine, &fs),
            Err(SyscallError::InvalidArgument)
        );
        assert_eq!(
            state.begin_execute(b"nosuch", 0, None, &fx.machine, &fs),
            Err(SyscallError::NotFound)
        );
        assert_eq!(
            state.begin_execute(b"frame0.txt", 0, None, &fx.machine, &fs),
            Err(SyscallError::NotExecutable)
        );
        assert_eq!(state.processes.running_count(), 0);
        assert_eq!(state.terminals.get(0), None);
        assert!(fx.machine.installed_program().is_none());
    }

    #[test]
    fn test_execute_table_full() {
        let fx = Fixture::new();
        let mut state = fx.state();
        let fs = fx.fs();
        for pid in 0..MAX_PROCESSES {
            let parent = pid.checked_sub(1);
            state.begin_execute(b"shell", 0, parent, &fx.machine, &fs).unwrap();
        }
        assert_eq!(
            state.begin_execute(b"shell", 0, Some(5), &fx.machine, &fs),
            Err(SyscallError::ProcessTableFull)
        );
        assert_eq!(state.terminals.get(0), Some(5));
    }

    #[test]
    fn test_failed_load_restores_parent() {
        let fx = Fixture::new();
        let mut state = fx.state();
        let fs = fx.fs();
        state.begin_execute(b"shell", 1, None, &fx.machine, &fs).unwrap();
        state.scheduler.set_cursor(1);

        fx.machine.fail_next_program_install();
        assert!(matches!(
            state.begin_execute(b"counter", 1, Some(0), &fx.machine, &fs),
            Err(SyscallError::Mapping(_))
        ));
        assert_eq!(state.terminals.get(1), Some(0));
        assert!(!state.processes.is_running(1));
        assert_eq!(state.address_space.installed(), Some(0));
    }

    #[test]
    fn test_orphan_terminal_frees_and_requeues() {
        let fx = Fixture::new();
        let mut state = fx.state();
        let fs = fx.fs();
        state.begin_execute(b"shell", 1, None, &fx.machine, &fs).unwrap();
        state.scheduler.clear_pending(1);
        state.scheduler.set_cursor(1);

        state.orphan_terminal(1, &fx.machine);
        assert_eq!(state.terminals.get(1), None);
        assert_eq!(state.processes.running_count(), 0);
        assert!(state.scheduler.is_pending(1));

        state.orphan_terminal(1, &fx.machine);
        assert!(state.scheduler.is_pending(1));
        assert_eq!(state.current_pid(), None);
    }

    #[test]
    fn test_halt_child_resumes_parent() {
        let fx = Fixture::new();
        let mut state = fx.state();
        let fs = fx.fs();
        state.begin_execute(b"shell", 0, None, &fx.machine, &fs).unwrap();
        let child = state
            .begin_execute(b"cat frame0.txt", 0, Some(0), &fx.machine, &fs)
            .unwrap();
        *state.processes.parent_context_mut(child.pid).unwrap() = SavedContext {
            stack_pointer: 0x7F_FE00,
            frame_pointer: 0x7F_FE40,
        };

        let transition = fx.with_io(|io| state.halt_transition(7, io, &fx.machine, &fs)).unwrap();
        assert_eq!(transition.halted, 1);
        assert_eq!(transition.status, 7);
        assert_eq!(transition.resume.stack_pointer, 0x7F_FE00);
        assert_eq!(state.terminals.get(0), Some(0));
        assert!(!state.processes.is_running(1));
        assert_eq!(fx.machine.installed_program(), Some(PhysAddr::new(8 * MIB)));
        assert_eq!(fx.machine.kernel_stack(), Some(VirtAddr::new(8 * MIB)));
    }

    #[test]
    fn test_halt_root_restarts_shell() {
        let fx = Fixture::new();
        let mut state = fx.state();
        let fs = fx.fs();
        state.begin_execute(b"shell", 2, None, &fx.machine, &fs).unwrap();
        state.scheduler.set_cursor(2);

        let transition = fx.with_io(|io| state.halt_transition(0, io, &fx.machine, &fs)).unwrap();
        assert_eq!(transition.halted, 0);
        let restarted = state.terminals.get(2).unwrap();
        let pcb = state.processes.get(restarted).unwrap();
        assert_eq!(pcb.parent, None);
        assert_eq!(pcb.terminal, 2);
        assert!(!transition.resume.is_empty());
        assert_eq!(transition.resume, pcb.context);
        assert!(fx
            .machine
            .events()
            .iter()
            .any(|event| matches!(event, Event::PrepareFirstRun { pid, .. } if *pid == restarted)));
    }

    #[test]
    fn test_pid_reuse_sees_clean_descriptors() {
        let fx = Fixture::new();
        let mut state = fx.state();
        let fs = fx.fs();
        state.begin_execute(b"shell", 0, None, &fx.machine, &fs).unwrap();
        state.begin_execute(b"cat", 0, Some(0), &fx.machine, &fs).unwrap();
        fx.with_io(|io| {
            state.open(b"frame0.txt", io, &fs).unwrap();
            state.open(b".", io, &fs).unwrap();
            state.halt_transition(0, io, &fx.machine, &fs).unwrap();
        });

        let launch = state.begin_execute(b"counter", 0, Some(0), &fx.machine, &fs).unwrap();
        assert_eq!(launch.pid, 1);
        let pcb = state.processes.get(1).unwrap();
        assert!(pcb.files[FIRST_USER_FD..]
            .iter()
            .all(|file| *file == FileDescriptor::CLOSED));
        assert!(pcb.args().is_empty());
    }

    #[test]
    fn test_open_exhaustion_keeps_existing() {
        let fx = Fixture::new();
        let mut state = fx.state();
        let fs = fx.fs();
        state.begin_execute(b"shell", 0, None, &fx.machine, &fs).unwrap();
        fx.with_io(|io| {
            for expected in FIRST_USER_FD..MAX_FILES {
                assert_eq!(state.open(b"frame0.txt", io, &fs), Ok(expected));
            }
            let before = state.processes.get(0).unwrap().files;
            assert_eq!(
                state.open(b"frame0.txt", io, &fs),
                Err(SyscallError::TooManyOpenFiles)
            );
            assert_eq!(state.processes.get(0).unwrap().files, before);
        });
    }

    #[test]
    fn test_close_rules() {
        let fx = Fixture::new();
        let mut state = fx.state();
        let fs = fx.fs();
        state.begin_execute(b"shell", 0, None, &fx.machine, &fs).unwrap();
        fx.with_io(|io| {
            assert_eq!(state.close(0, io), Err(SyscallError::BadFileDescriptor));
            assert_eq!(state.close(1, io), Err(SyscallError::BadFileDescriptor));
            assert_eq!(state.close(2, io), Err(SyscallError::BadFileDescriptor));
            assert_eq!(state.close(8, io), Err(SyscallError::BadFileDescriptor));

            let fd = state.open(b"rtc", io, &fs).unwrap();
            assert_eq!(state.close(fd as i32, io), Ok(()));
            assert_eq!(state.processes.get(0).unwrap().files[fd], FileDescriptor::CLOSED);
            assert_eq!(state.close(fd as i32, io), Err(SyscallError::BadFileDescriptor));
        });
    }

    #[test]
    fn test_getargs() {
        let fx = Fixture::new();
        let mut state = fx.state();
        let fs = fx.fs();
        state.begin_execute(b"cat arg1", 0, None, &fx.machine, &fs).unwrap();
        let mut buf = [0xAAu8; 33];
        assert_eq!(state.getargs(&mut buf), Ok(0));
        assert_eq!(&buf[..5], b"arg1\0");

        let mut tiny = [0u8; 4];
        assert_eq!(state.getargs(&mut tiny), Err(SyscallError::InvalidArgument));
    }

    #[test]
    fn test_getargs_missing_or_long() {
        let fx = Fixture::new();
        let mut state = fx.state();
        let fs = fx.fs();
        state.begin_execute(b"cat", 0, None, &fx.machine, &fs).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(state.getargs(&mut buf), Err(SyscallError::InvalidArgument));

        let long_args = b"cat aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        state.begin_execute(long_args, 0, Some(0), &fx.machine, &fs).unwrap();
        assert_eq!(state.getargs(&mut buf), Err(SyscallError::InvalidArgument));
    }

    #[test]
    fn test_vidmap_maps_callers_terminal() {
        let fx = Fixture::new();
        let mut state = fx.state();
        let fs = fx.fs();
        state.begin_execute(b"fish", 1, None, &fx.machine, &fs).unwrap();
        state.scheduler.set_cursor(1);
        let screen = state.vidmap(&fx.machine).unwrap();
        assert_eq!(screen.as_u64(), 0xEFFF_E000);
        assert!(state.address_space.is_display_mapped(1));
        assert!(!state.address_space.is_display_mapped(0));
    }
}
