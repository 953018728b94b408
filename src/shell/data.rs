//! Static bait tables: credentials, virtual filesystem, canned outputs,
//! environment defaults. Pure data consumed by the shell engine and the
//! authentication paths; nothing here has behavior.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Built-in bait credentials. Deliberately the classics that credential
/// stuffers try first.
pub static CREDENTIALS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("root", "toor"),
        ("admin", "admin"),
        ("user", "password"),
        ("test", "test"),
        ("guest", "guest"),
        ("ubuntu", "ubuntu"),
        ("pi", "raspberry"),
        ("operator", "123456"),
        ("manager", "manager"),
        ("service", "service123"),
    ])
});

/// Virtual filesystem: path → ordered child entries. Listings for these
/// paths are stable and deterministic.
pub static FILESYSTEM: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    HashMap::from([
        (
            "/",
            &[
                "bin", "boot", "dev", "etc", "home", "lib", "media", "mnt", "opt", "proc",
                "root", "run", "sbin", "srv", "sys", "tmp", "usr", "var",
            ][..],
        ),
        ("/home", &["user", "admin", "guest"][..]),
        ("/etc", &["passwd", "shadow", "hosts", "fstab", "crontab", "ssh"][..]),
        ("/var", &["log", "www", "lib", "tmp"][..]),
        ("/var/log", &["auth.log", "syslog", "messages", "secure"][..]),
        ("/usr", &["bin", "lib", "local", "share"][..]),
        (
            "/usr/bin",
            &["ls", "cat", "grep", "ps", "top", "netstat", "wget", "curl"][..],
        ),
        (
            "/bin",
            &["sh", "bash", "ls", "cat", "cp", "mv", "rm", "mkdir", "rmdir"][..],
        ),
        ("/sbin", &["ifconfig", "iptables", "service", "systemctl"][..]),
    ])
});

/// Listing returned for paths outside the modeled tree: a random non-empty
/// subset of these, per call.
pub const PLACEHOLDER_FILES: [&str; 4] = ["file1.txt", "file2.log", "data.conf", "backup.tar.gz"];

/// Canned outputs keyed by the exact full command line (command plus all
/// arguments, space-joined).
pub static CANNED_OUTPUTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("ls", "Documents  Downloads  Music  Pictures  Videos"),
        ("pwd", "/home/user"),
        ("whoami", "user"),
        ("id", "uid=1000(user) gid=1000(user) groups=1000(user)"),
        (
            "uname -a",
            "Linux server01 5.4.0-74-generic #83-Ubuntu SMP Sat May 8 02:35:39 UTC 2021 x86_64 x86_64 x86_64 GNU/Linux",
        ),
        (
            "ps aux",
            "USER       PID %CPU %MEM    VSZ   RSS TTY      STAT START   TIME COMMAND\n\
             root         1  0.0  0.1 169424  2048 ?        Ss   10:00   0:01 /sbin/init\n\
             root         2  0.0  0.0      0     0 ?        S    10:00   0:00 [kthreadd]\n\
             user      1234  0.0  0.2  21308  4096 pts/0    Ss   10:30   0:00 -bash",
        ),
        (
            "netstat -an",
            "Active Internet connections (servers and established)\n\
             Proto Recv-Q Send-Q Local Address           Foreign Address         State\n\
             tcp        0      0 0.0.0.0:22              0.0.0.0:*               LISTEN\n\
             tcp        0      0 127.0.0.1:3306          0.0.0.0:*               LISTEN\n\
             tcp        0      0 0.0.0.0:80              0.0.0.0:*               LISTEN",
        ),
        (
            "ifconfig",
            "eth0: flags=4163<UP,BROADCAST,RUNNING,MULTICAST>  mtu 1500\n\
             \u{20}       inet 192.168.1.100  netmask 255.255.255.0  broadcast 192.168.1.255\n\
             \u{20}       ether 00:0c:29:12:34:56  txqueuelen 1000  (Ethernet)",
        ),
        (
            "df -h",
            "Filesystem      Size  Used Avail Use% Mounted on\n\
             /dev/sda1        20G  8.5G   11G  44% /\n\
             tmpfs           2.0G     0  2.0G   0% /dev/shm",
        ),
        (
            "free -m",
            "              total        used        free      shared  buff/cache   available\n\
             Mem:           3936        1024        1548          12        1364        2648\n\
             Swap:          2047           0        2047",
        ),
        (
            "cat /etc/passwd",
            "root:x:0:0:root:/root:/bin/bash\n\
             daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin\n\
             bin:x:2:2:bin:/bin:/usr/sbin/nologin\n\
             user:x:1000:1000:User:/home/user:/bin/bash",
        ),
    ])
});

/// Environment defaults seeded into every new session, in display order.
pub const ENV_DEFAULTS: [(&str, &str); 7] = [
    ("PATH", "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin"),
    ("HOME", "/home/user"),
    ("USER", "user"),
    ("SHELL", "/bin/bash"),
    ("TERM", "xterm-256color"),
    ("LANG", "en_US.UTF-8"),
    ("PWD", "/home/user"),
];
